// Renderq Infrastructure - Process Adapter
// Implements: GenerationPipeline by spawning the external render command
// and mapping its stdout stage markers to milestone progress

mod command_pipeline;

pub use command_pipeline::CommandPipeline;
