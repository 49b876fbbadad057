//! Processor chains: ordered in-place transforms on mixing-format frames

use std::sync::Arc;

/// In-place transform over interleaved f32 frames
///
/// `frame_count` is the number of frames in `frames`; the channel count is
/// `frames.len() / frame_count`. Any `Fn(&mut [f32], usize)` closure that is
/// `Send + Sync` is a processor.
pub trait AudioProcessor: Send + Sync {
    fn process(&self, frames: &mut [f32], frame_count: usize);
}

impl<F> AudioProcessor for F
where
    F: Fn(&mut [f32], usize) + Send + Sync,
{
    fn process(&self, frames: &mut [f32], frame_count: usize) {
        self(frames, frame_count)
    }
}

/// Shared processor reference; attach/detach identify processors by this pointer
pub type ProcessorRef = Arc<dyn AudioProcessor>;

/// Wrap a closure as a processor reference
pub fn processor<F>(f: F) -> ProcessorRef
where
    F: Fn(&mut [f32], usize) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Ordered list of processors, run in attach order
#[derive(Default, Clone)]
pub(crate) struct ProcessorChain {
    nodes: Vec<ProcessorRef>,
}

impl ProcessorChain {
    /// Append at the tail; attaching the same processor twice adds two nodes
    pub(crate) fn attach(&mut self, processor: ProcessorRef) {
        self.nodes.push(processor);
    }

    /// Remove every node referring to `processor`, returning how many went
    pub(crate) fn detach(&mut self, processor: &ProcessorRef) -> usize {
        let before = self.nodes.len();
        let target = Arc::as_ptr(processor) as *const ();
        self.nodes
            .retain(|node| Arc::as_ptr(node) as *const () != target);
        before - self.nodes.len()
    }

    pub(crate) fn run(&self, frames: &mut [f32], frame_count: usize) {
        for node in &self.nodes {
            node.process(frames, frame_count);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("len", &self.nodes.len())
            .finish()
    }
}
