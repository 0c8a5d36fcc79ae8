use std::collections::{BTreeMap, HashMap};

use crate::foundation::error::{PipelineError, PipelineResult};
use crate::output::contract::{CompletedFrame, FrameMetadata, RenderedPass};

#[derive(Debug)]
struct PendingFrame {
    expected: Vec<String>,
    metadata: FrameMetadata,
    passes: BTreeMap<String, RenderedPass>,
}

/// Collects render passes into complete output frames and releases them in frame order.
///
/// A frame is complete once every pass declared in [`OutputFrameAccumulator::expect`] has been
/// received. Each frame completes at most once.
#[derive(Debug, Default)]
pub struct OutputFrameAccumulator {
    pending: HashMap<i64, PendingFrame>,
    ready: HashMap<i64, CompletedFrame>,
    next: Option<i64>,
    last_expected: Option<i64>,
    completed: u64,
}

impl OutputFrameAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `frame` will be rendered with the given passes.
    ///
    /// Frames must be declared in strictly increasing order.
    pub fn expect(
        &mut self,
        frame: i64,
        passes: &[String],
        metadata: FrameMetadata,
    ) -> PipelineResult<()> {
        if self.last_expected.is_some_and(|last| frame <= last) {
            return Err(PipelineError::contract(format!(
                "output frame {frame} queued out of order"
            )));
        }
        if passes.is_empty() {
            return Err(PipelineError::contract(format!(
                "output frame {frame} queued with no passes"
            )));
        }
        self.next.get_or_insert(frame);
        self.last_expected = Some(frame);
        self.pending.insert(
            frame,
            PendingFrame {
                expected: passes.to_vec(),
                metadata,
                passes: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Accept one reported pass.
    ///
    /// Reports for frames that were never queued, for passes that were not expected, or for a
    /// pass that already arrived are contract violations.
    pub fn receive(&mut self, pass: RenderedPass) -> PipelineResult<()> {
        let frame = pass.output_frame_number;
        let Some(pending) = self.pending.get_mut(&frame) else {
            return Err(PipelineError::contract(format!(
                "render pass '{}' reported for unqueued output frame {frame}",
                pass.pass
            )));
        };
        if !pending.expected.contains(&pass.pass) {
            return Err(PipelineError::contract(format!(
                "render pass '{}' was not expected for output frame {frame}",
                pass.pass
            )));
        }
        if pending.passes.contains_key(&pass.pass) {
            return Err(PipelineError::contract(format!(
                "render pass '{}' reported twice for output frame {frame}",
                pass.pass
            )));
        }
        pending.passes.insert(pass.pass.clone(), pass);

        if pending.passes.len() == pending.expected.len()
            && let Some(done) = self.pending.remove(&frame)
        {
            self.completed += 1;
            self.ready.insert(
                frame,
                CompletedFrame {
                    output_frame_number: frame,
                    metadata: done.metadata,
                    passes: done.passes,
                },
            );
        }
        Ok(())
    }

    /// Completed frames that can be forwarded without breaking frame order.
    pub fn drain_ready(&mut self) -> Vec<CompletedFrame> {
        let mut out = Vec::new();
        let Some(mut next) = self.next else {
            return out;
        };
        while let Some(frame) = self.ready.remove(&next) {
            out.push(frame);
            next += 1;
        }
        self.next = Some(next);
        out
    }

    /// Every completed frame still held back, in order, skipping frames that never completed.
    pub fn drain_remaining(&mut self) -> Vec<CompletedFrame> {
        let mut frames: Vec<_> = self.ready.drain().map(|(_, f)| f).collect();
        frames.sort_by_key(|f| f.output_frame_number);
        if let Some(last) = frames.last() {
            self.next = Some(last.output_frame_number + 1);
        }
        frames
    }

    /// Frames queued but not yet complete.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Frames completed so far, forwarded or not.
    pub fn completed(&self) -> u64 {
        self.completed
    }
}

#[cfg(test)]
#[path = "../../tests/unit/output/accumulator.rs"]
mod tests;
