// Renderq Infrastructure - File Adapter
// Implements: JobStore over one atomically replaced JSON document

mod document;
mod store;

pub use store::FileJobStore;
