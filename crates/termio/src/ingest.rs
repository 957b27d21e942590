/// Consumer of bytes arriving from the transport.
///
/// Called from the transport's read thread, never from the worker thread,
/// and never concurrently with itself for one transport. Implementations
/// must therefore be `Send + Sync` and tolerate being called from a thread
/// other than the one that owns the rest of the terminal state.
pub trait Ingest: Send + Sync {
    fn ingest(&self, data: &[u8]);
}
