use wgpu::{Device, ShaderModule, ShaderModuleDescriptor, ShaderSource};

pub const COMMON: &str = include_str!("common.wgsl");

/// Load a shader by concatenating shared includes with a main shader source.
pub fn load_shader(device: &Device, label: &str, includes: &[&str], main_source: &str) -> ShaderModule {
    device.create_shader_module(ShaderModuleDescriptor {
        label: Some(label),
        source: ShaderSource::Wgsl(combine(includes, main_source).into()),
    })
}

/// Load a kernel that needs common.wgsl.
pub fn load_with_common(device: &Device, label: &str, main_source: &str) -> ShaderModule {
    load_shader(device, label, &[COMMON], main_source)
}

pub fn combine(includes: &[&str], main_source: &str) -> String {
    let mut combined = String::new();
    for include in includes {
        combined.push_str(include);
        combined.push('\n');
    }
    combined.push_str(main_source);
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_come_first() {
        assert_eq!(combine(&["a", "b"], "main"), "a\nb\nmain");
    }
}
