use crate::error::Result;
use crate::gpu::buffers::{BufferRegistry, BufferRole};
use crate::gpu::shader_loader::load_with_common;
use std::collections::HashMap;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayoutDescriptor, BindGroupLayoutEntry,
    BindingType, BufferBindingType, ComputePipeline, ComputePipelineDescriptor, Device,
    PipelineLayoutDescriptor, ShaderStages,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    Read,
    ReadWrite,
}

/// One `@binding(slot)` of a kernel's group 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Binding {
    pub slot: u32,
    pub role: BufferRole,
    pub access: Access,
}

const fn read(slot: u32, role: BufferRole) -> Binding {
    Binding {
        slot,
        role,
        access: Access::Read,
    }
}

const fn write(slot: u32, role: BufferRole) -> Binding {
    Binding {
        slot,
        role,
        access: Access::ReadWrite,
    }
}

use BufferRole as R;

const CULL: &[Binding] = &[
    read(0, R::CameraUniforms),
    read(1, R::SourcePoints),
    write(2, R::VisiblePoints),
    write(3, R::IndirectDraw),
];
const MORTON_ASSIGN: &[Binding] = &[
    read(0, R::LpcUniforms),
    read(1, R::SourcePoints),
    write(2, R::MortonCodes),
    write(3, R::SortIndices),
];
const BITONIC_SORT: &[Binding] = &[
    read(0, R::BitonicParams),
    write(1, R::MortonCodes),
    write(2, R::SortIndices),
];
const REORDER: &[Binding] = &[
    read(0, R::LpcUniforms),
    read(1, R::SourcePoints),
    read(2, R::SortIndices),
    write(3, R::ReorderScratch),
];
const MARK_HEADS: &[Binding] = &[
    read(0, R::LpcUniforms),
    read(1, R::MortonCodes),
    write(2, R::HeadFlags),
];
const SCATTER: &[Binding] = &[
    read(0, R::LpcUniforms),
    read(1, R::MortonCodes),
    read(2, R::HeadFlags),
    read(3, R::ScannedIndices),
    write(4, R::UniqueCodes),
    write(5, R::VoxelStarts),
];
const INIT_LEAVES: &[Binding] = &[
    read(0, R::LpcUniforms),
    read(1, R::UniqueCodes),
    read(2, R::VoxelStarts),
    write(3, R::Nodes),
];
const BUILD_INTERNAL: &[Binding] = &[
    read(0, R::LpcUniforms),
    read(1, R::UniqueCodes),
    read(2, R::VoxelStarts),
    write(3, R::Nodes),
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Kernel {
    Cull,
    MortonAssign,
    BitonicSort,
    Reorder,
    MarkHeads,
    Scatter,
    InitLeaves,
    BuildInternal,
}

impl Kernel {
    pub const LPC: [Kernel; 7] = [
        Kernel::MortonAssign,
        Kernel::BitonicSort,
        Kernel::Reorder,
        Kernel::MarkHeads,
        Kernel::Scatter,
        Kernel::InitLeaves,
        Kernel::BuildInternal,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Kernel::Cull => "frustum cull",
            Kernel::MortonAssign => "morton assign",
            Kernel::BitonicSort => "bitonic sort",
            Kernel::Reorder => "reorder",
            Kernel::MarkHeads => "mark heads",
            Kernel::Scatter => "scatter",
            Kernel::InitLeaves => "init leaves",
            Kernel::BuildInternal => "build internal",
        }
    }

    /// The binding layout contract with the WGSL source, in slot order.
    pub fn bindings(self) -> &'static [Binding] {
        match self {
            Kernel::Cull => CULL,
            Kernel::MortonAssign => MORTON_ASSIGN,
            Kernel::BitonicSort => BITONIC_SORT,
            Kernel::Reorder => REORDER,
            Kernel::MarkHeads => MARK_HEADS,
            Kernel::Scatter => SCATTER,
            Kernel::InitLeaves => INIT_LEAVES,
            Kernel::BuildInternal => BUILD_INTERNAL,
        }
    }

    pub fn source(self) -> &'static str {
        match self {
            Kernel::Cull => include_str!("cull.wgsl"),
            Kernel::MortonAssign => include_str!("morton_assign.wgsl"),
            Kernel::BitonicSort => include_str!("bitonic_sort.wgsl"),
            Kernel::Reorder => include_str!("reorder.wgsl"),
            Kernel::MarkHeads => include_str!("mark_heads.wgsl"),
            Kernel::Scatter => include_str!("scatter.wgsl"),
            Kernel::InitLeaves => include_str!("init_leaves.wgsl"),
            Kernel::BuildInternal => include_str!("build_internal.wgsl"),
        }
    }

    pub fn writes(self) -> impl Iterator<Item = BufferRole> {
        self.bindings()
            .iter()
            .filter(|b| b.access == Access::ReadWrite)
            .map(|b| b.role)
    }
}

fn layout_entry(binding: &Binding) -> BindGroupLayoutEntry {
    let ty = if binding.role.is_uniform() {
        BufferBindingType::Uniform
    } else {
        BufferBindingType::Storage {
            read_only: binding.access == Access::Read,
        }
    };
    BindGroupLayoutEntry {
        binding: binding.slot,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Compiled pipelines plus their input sets, bound against one buffer registry.
pub struct KernelSet {
    pipelines: HashMap<Kernel, ComputePipeline>,
    bind_groups: HashMap<Kernel, BindGroup>,
}

impl KernelSet {
    pub fn new(device: &Device, registry: &BufferRegistry, kernels: &[Kernel]) -> Result<Self> {
        let mut pipelines = HashMap::new();
        let mut bind_groups = HashMap::new();

        for &kernel in kernels {
            let label = kernel.label();
            let layout_entries: Vec<BindGroupLayoutEntry> =
                kernel.bindings().iter().map(layout_entry).collect();
            let bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &layout_entries,
            });
            let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&bgl],
                immediate_size: 0,
            });
            let module = load_with_common(device, label, kernel.source());
            let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

            let entries = kernel
                .bindings()
                .iter()
                .map(|b| {
                    Ok(BindGroupEntry {
                        binding: b.slot,
                        resource: registry.require(b.role)?.as_entire_binding(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let bind_group = device.create_bind_group(&BindGroupDescriptor {
                label: Some(label),
                layout: &bgl,
                entries: &entries,
            });

            pipelines.insert(kernel, pipeline);
            bind_groups.insert(kernel, bind_group);
        }
        log::debug!("compiled {} compute kernels", pipelines.len());

        Ok(Self {
            pipelines,
            bind_groups,
        })
    }

    pub fn get(&self, kernel: Kernel) -> Option<(&ComputePipeline, &BindGroup)> {
        Some((self.pipelines.get(&kernel)?, self.bind_groups.get(&kernel)?))
    }
}
