//! Pipeline: an ordered chain of stages between two boundary channels
//!
//! ```text
//! links[0] ──► stage 0 ──► links[1] ──► stage 1 ──► … ──► links[n]
//! (unprocessed-in)                                        (processed-out)
//! ```
//!
//! Every mutation edits `stages` and `links` together and then rebinds each
//! stage whose wiring changed. Workers are never restarted by a mutation, so
//! frames the neighbours are holding keep flowing.

use tracing::{debug, info};

use crate::effects::SharedTransform;
use crate::error::{PipelineError, PipelineResult};

use super::channel::{FrameChannel, Offer};
use super::stage::{Stage, StageStats};

pub struct Pipeline {
    stages: Vec<Stage>,
    /// `links[i]` feeds stage `i`, `links[i + 1]` receives its output.
    links: Vec<FrameChannel>,
    capacity: usize,
    running: bool,
}

impl Pipeline {
    /// Build a pipeline reading `input` and writing `output`.
    ///
    /// Inner channels get the capacity of `input`. With no transforms the
    /// pipeline holds a single pass-through stage.
    pub fn new(
        input: FrameChannel,
        output: FrameChannel,
        transforms: impl IntoIterator<Item = SharedTransform>,
    ) -> Self {
        let capacity = input.capacity();
        let mut stages: Vec<Stage> = transforms.into_iter().map(Stage::new).collect();
        if stages.is_empty() {
            stages.push(Stage::placeholder());
        }

        let mut links = Vec::with_capacity(stages.len() + 1);
        links.push(input);
        for _ in 1..stages.len() {
            links.push(FrameChannel::bounded(capacity));
        }
        links.push(output);

        let pipeline = Self {
            stages,
            links,
            capacity,
            running: false,
        };
        pipeline.rewire();
        pipeline
    }

    /// A new pipeline with the same effects and boundary channels.
    pub fn replicate(&self) -> Self {
        Self::new(self.input().clone(), self.output().clone(), self.list_effects())
    }

    pub fn input(&self) -> &FrameChannel {
        &self.links[0]
    }

    pub fn output(&self) -> &FrameChannel {
        &self.links[self.links.len() - 1]
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start every worker not yet started.
    pub fn start(&mut self) -> PipelineResult<()> {
        debug!("start()");
        for stage in &mut self.stages {
            stage.start()?;
        }
        self.running = true;
        Ok(())
    }

    /// Cancel every worker. Channels are not drained.
    pub fn stop(&mut self) {
        debug!("stop()");
        for stage in &mut self.stages {
            stage.stop();
        }
        self.running = false;
    }

    /// Number of effects, not counting the placeholder.
    pub fn len(&self) -> usize {
        self.stages.iter().filter(|stage| !stage.is_placeholder()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Effects in order, placeholder excluded.
    pub fn list_effects(&self) -> Vec<SharedTransform> {
        self.stages
            .iter()
            .filter(|stage| !stage.is_placeholder())
            .map(|stage| stage.transform().clone())
            .collect()
    }

    /// Add `transform` after the current last effect.
    pub fn append(&mut self, transform: SharedTransform) -> PipelineResult<()> {
        self.insert_at(self.len(), transform)
    }

    /// Splice `transform` in at `index`. Indices past the end append.
    pub fn insert_at(&mut self, index: usize, transform: SharedTransform) -> PipelineResult<()> {
        info!("insert_at({index}, {})", transform.label());

        if self.is_empty() {
            // Replace the placeholder rather than chaining after it
            self.stages.clear();
            self.stages.push(Stage::new(transform));
            self.rewire();
            return self.start_if_running();
        }

        let n = self.stages.len();
        let index = index.min(n);
        // Inner insert: the successor gets a fresh input. Append: the old
        // last stage gets a fresh output. Boundaries never move.
        let at = if index < n { index + 1 } else { n };
        self.links.insert(at, FrameChannel::bounded(self.capacity));
        self.stages.insert(index, Stage::new(transform));

        self.rewire();
        self.start_if_running()
    }

    /// Remove the effect at `index` and return its transform.
    pub fn remove_at(&mut self, index: usize) -> PipelineResult<SharedTransform> {
        let len = self.len();
        if index >= len {
            return Err(PipelineError::IndexOutOfRange { index, len });
        }

        let mut stage = self.stages.remove(index);
        stage.stop();
        info!("remove_at({index}, {})", stage.transform().label());

        if self.stages.is_empty() {
            self.stages.push(Stage::placeholder());
        } else if index == self.stages.len() {
            // Removed the last stage: its predecessor now feeds the output.
            // Frames queued for the removed tail are already complete under
            // the new topology; pass them on ahead of anything newer.
            let orphan = self.links.remove(index);
            let output = self.output();
            let forwarded = orphan
                .receiver()
                .drain()
                .map(|frame| output.offer(frame))
                .filter(|offer| *offer == Offer::Accepted)
                .count();
            debug!(forwarded, "Forwarded frames queued for removed stage");
        } else {
            // The successor takes over the removed stage's input
            let orphan = self.links.remove(index + 1);
            let discarded = orphan.clear();
            if discarded > 0 {
                debug!(discarded, "Discarded frames between removed stage and successor");
            }
        }
        self.rewire();

        self.start_if_running()?;
        Ok(stage.transform().clone())
    }

    /// Move the effect at `from` so it ends up at `to`.
    ///
    /// `to` is interpreted after removal, as if `remove_at(from)` then
    /// `insert_at(to, ..)`, but done as one splice: the pipeline never runs
    /// with a stage missing and the moved worker is only rebound.
    pub fn move_effect(&mut self, from: usize, to: usize) -> PipelineResult<()> {
        let len = self.len();
        if from >= len {
            return Err(PipelineError::IndexOutOfRange { index: from, len });
        }

        let to = to.min(len - 1);
        info!("move_effect({from}, {to})");
        if from == to {
            return Ok(());
        }

        let stage = self.stages.remove(from);
        self.stages.insert(to, stage);

        // Frames between the moved positions carry effects from the old
        // order; the stages now reading them would apply the wrong remainder.
        // Unbinding first guarantees nothing is pushed there once cleared.
        let (lo, hi) = (from.min(to), from.max(to));
        self.stages[lo..=hi].iter().for_each(Stage::unbind);
        let discarded: usize = self.links[lo + 1..=hi].iter().map(FrameChannel::clear).sum();
        if discarded > 0 {
            debug!(discarded, "Discarded frames queued under the old order");
        }

        self.rewire();
        Ok(())
    }

    /// Drop every effect and leave a single pass-through stage.
    pub fn clear_effects(&mut self) -> PipelineResult<()> {
        info!("clear_effects()");
        for stage in &mut self.stages {
            stage.stop();
        }
        self.stages.clear();

        let last = self.links.len() - 1;
        self.links.drain(1..last).for_each(drop);
        self.stages.push(Stage::placeholder());

        self.rewire();
        self.start_if_running()
    }

    pub fn stats(&self) -> Vec<StageStats> {
        self.stages.iter().map(Stage::stats).collect()
    }

    /// Frames queued on each channel, input boundary first.
    pub fn occupancy(&self) -> Vec<usize> {
        self.links.iter().map(FrameChannel::len).collect()
    }

    fn start_if_running(&mut self) -> PipelineResult<()> {
        if self.running {
            self.start()?;
        }
        Ok(())
    }

    /// Bring every stage's wiring in line with `links`.
    fn rewire(&self) {
        debug_assert_eq!(self.links.len(), self.stages.len() + 1);
        let rebound = self
            .stages
            .iter()
            .enumerate()
            .filter(|(i, stage)| stage.bind(&self.links[*i], &self.links[*i + 1]))
            .count();
        debug!(rebound, stages = self.stages.len(), "Pipeline rewired");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .field("running", &self.running)
            .finish()
    }
}
