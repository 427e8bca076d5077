use crate::error::{LpcError, Result};
use crate::gpu::buffers::{BufferRegistry, BufferRole};
use crate::gpu::dispatch::dispatch_for_items;
use crate::gpu::kernels::{Access, Kernel};
use std::collections::HashMap;

/// Largest payload accepted by [`Recorder::inline_update`]; bigger writes go through
/// [`Recorder::upload`].
pub const MAX_INLINE_UPDATE: usize = 65536;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Transfer,
    Compute,
    /// Indirect argument and vertex consumption by draws.
    DrawIndirect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Write {
        role: BufferRole,
        offset: u64,
        data: Vec<u8>,
    },
    Barrier {
        src: PipelineStage,
        dst: PipelineStage,
    },
    Dispatch {
        kernel: Kernel,
        groups: [u32; 3],
    },
    Download {
        role: BufferRole,
    },
}

/// A write that has not been made visible to every stage yet.
#[derive(Debug, Clone)]
struct Hazard {
    writer: PipelineStage,
    visible_to: Vec<PipelineStage>,
}

/// Ordered command list for one submission.
///
/// Every write leaves a hazard on its buffer role. A barrier from the writing stage
/// releases it to the barrier's destination stage, and any later access from a stage
/// it was not released to is rejected while recording. A fresh recorder starts with
/// no hazards, matching the full synchronisation of a blocking submission.
///
/// Hazards are tracked per allocation: roles aliased onto another role share its
/// hazard.
#[derive(Debug, Default)]
pub struct Recorder {
    commands: Vec<Command>,
    hazards: HashMap<BufferRole, Hazard>,
    aliases: HashMap<BufferRole, BufferRole>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that knows which roles of `registry` share an allocation.
    pub fn for_registry(registry: &BufferRegistry) -> Self {
        let mut rec = Self::new();
        for (role, target) in registry.aliases() {
            rec = rec.with_alias(role, target);
        }
        rec
    }

    pub fn with_alias(mut self, role: BufferRole, target: BufferRole) -> Self {
        self.aliases.insert(role, target);
        self
    }

    fn resolve(&self, role: BufferRole) -> BufferRole {
        self.aliases.get(&role).copied().unwrap_or(role)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn dispatch_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::Dispatch { .. }))
            .count()
    }

    pub fn downloads(&self) -> impl Iterator<Item = BufferRole> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::Download { role } => Some(*role),
            _ => None,
        })
    }

    fn check_read(&self, kernel: Option<Kernel>, role: BufferRole, stage: PipelineStage) -> Result<()> {
        match self.hazards.get(&self.resolve(role)) {
            Some(hazard) if !hazard.visible_to.contains(&stage) => Err(LpcError::MissingBarrier {
                kernel,
                role,
                writer: hazard.writer,
                stage,
            }),
            _ => Ok(()),
        }
    }

    // Write-after-write needs at least one barrier after the previous writer.
    fn check_write(&self, kernel: Option<Kernel>, role: BufferRole, stage: PipelineStage) -> Result<()> {
        match self.hazards.get(&self.resolve(role)) {
            Some(hazard) if hazard.visible_to.is_empty() => Err(LpcError::MissingBarrier {
                kernel,
                role,
                writer: hazard.writer,
                stage,
            }),
            _ => Ok(()),
        }
    }

    fn mark_written(&mut self, role: BufferRole, writer: PipelineStage) {
        self.hazards.insert(
            self.resolve(role),
            Hazard {
                writer,
                visible_to: Vec::new(),
            },
        );
    }

    /// Small ordered host write, e.g. per-step sort parameters.
    pub fn inline_update(&mut self, role: BufferRole, offset: u64, data: &[u8]) -> Result<()> {
        if data.len() > MAX_INLINE_UPDATE {
            return Err(LpcError::InlineUpdateTooLarge {
                role,
                bytes: data.len(),
                limit: MAX_INLINE_UPDATE,
            });
        }
        self.write(role, offset, data)
    }

    /// Host write of arbitrary size at offset 0.
    pub fn upload(&mut self, role: BufferRole, data: &[u8]) -> Result<()> {
        self.write(role, 0, data)
    }

    fn write(&mut self, role: BufferRole, offset: u64, data: &[u8]) -> Result<()> {
        self.check_write(None, role, PipelineStage::Transfer)?;
        self.commands.push(Command::Write {
            role,
            offset,
            data: data.to_vec(),
        });
        self.mark_written(role, PipelineStage::Transfer);
        Ok(())
    }

    pub fn barrier(&mut self, src: PipelineStage, dst: PipelineStage) {
        for hazard in self.hazards.values_mut() {
            if hazard.writer == src && !hazard.visible_to.contains(&dst) {
                hazard.visible_to.push(dst);
            }
        }
        self.commands.push(Command::Barrier { src, dst });
    }

    pub fn dispatch(&mut self, kernel: Kernel, groups: [u32; 3]) -> Result<()> {
        for binding in kernel.bindings() {
            self.check_read(Some(kernel), binding.role, PipelineStage::Compute)?;
            if binding.access == Access::ReadWrite {
                self.check_write(Some(kernel), binding.role, PipelineStage::Compute)?;
            }
        }
        self.commands.push(Command::Dispatch { kernel, groups });
        for role in kernel.writes() {
            self.mark_written(role, PipelineStage::Compute);
        }
        Ok(())
    }

    /// Dispatch one thread per item; records nothing for zero items.
    pub fn dispatch_items(&mut self, kernel: Kernel, items: u32) -> Result<()> {
        if items == 0 {
            return Ok(());
        }
        self.dispatch(kernel, dispatch_for_items(items))
    }

    /// Copy `role` back to the host once the submission has completed.
    pub fn download(&mut self, role: BufferRole) -> Result<()> {
        self.check_read(None, role, PipelineStage::Transfer)?;
        self.commands.push(Command::Download { role });
        Ok(())
    }
}
