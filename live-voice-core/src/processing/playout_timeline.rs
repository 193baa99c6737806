/// Sample-accurate playout of buffers scheduled at absolute times.
///
/// The timeline's clock is the number of frames rendered so far, so it only
/// moves when the output device pulls audio. Buffers are mono at the
/// timeline's rate; overlapping buffers are summed and the mix is clamped.
#[derive(Debug)]
pub struct PlayoutTimeline {
    sample_rate: u32,
    position: u64,
    buffers: Vec<ScheduledBuffer>,
}

#[derive(Debug)]
struct ScheduledBuffer {
    id: u64,
    start_frame: u64,
    samples: Vec<f32>,
}

impl ScheduledBuffer {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

impl PlayoutTimeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            position: 0,
            buffers: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames rendered since the timeline was created.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Clock time in seconds.
    pub fn current_time(&self) -> f64 {
        self.position as f64 / f64::from(self.sample_rate)
    }

    /// Convert a clock time to a frame index (rounded to the nearest frame).
    pub fn frame_at(&self, time_secs: f64) -> u64 {
        (time_secs.max(0.0) * f64::from(self.sample_rate)).round() as u64
    }

    /// Schedule `samples` to start at `start_time` seconds.
    ///
    /// A start that has already slipped into the past begins at the current
    /// position; the buffer is delayed, never clipped.
    pub fn schedule(&mut self, id: u64, start_time: f64, samples: Vec<f32>) {
        if samples.is_empty() {
            return;
        }
        let start_frame = self.frame_at(start_time).max(self.position);
        self.buffers.push(ScheduledBuffer {
            id,
            start_frame,
            samples,
        });
    }

    /// Remove one buffer whether it has started or not.
    pub fn cancel(&mut self, id: u64) -> bool {
        let before = self.buffers.len();
        self.buffers.retain(|b| b.id != id);
        self.buffers.len() != before
    }

    /// Remove every buffer. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.buffers.len();
        self.buffers.clear();
        count
    }

    pub fn active_count(&self) -> usize {
        self.buffers.len()
    }

    /// Render the next `out.len()` mono frames and advance the clock.
    ///
    /// Returns the ids of buffers that finished playing within this block.
    pub fn render(&mut self, out: &mut [f32]) -> Vec<u64> {
        out.fill(0.0);
        let block_start = self.position;
        let block_end = block_start + out.len() as u64;

        for buffer in &self.buffers {
            let from = buffer.start_frame.max(block_start);
            let to = buffer.end_frame().min(block_end);
            for frame in from..to {
                let src = (frame - buffer.start_frame) as usize;
                let dst = (frame - block_start) as usize;
                out[dst] += buffer.samples[src];
            }
        }
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.position = block_end;

        let mut finished = Vec::new();
        self.buffers.retain(|b| {
            if b.end_frame() <= block_end {
                finished.push(b.id);
                false
            } else {
                true
            }
        });
        finished
    }
}
