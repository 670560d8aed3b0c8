use super::SampleSink;
use crate::error::Result;

/// Resamples event streams to a fixed rate.
///
/// Every channel holds its last value until its next event. Whenever a
/// `quantum` wide window is complete the inner sink receives the time
/// weighted mean of every channel over it, stamped with the window start.
#[derive(Debug)]
pub struct Aggregator<S> {
    inner: S,
    quantum: f64,
    /// Index of the open window
    window: u64,
    /// Time up to which `acc` is integrated
    last: f64,
    acc: Vec<f64>,
    current: Vec<f64>,
}

impl<S: SampleSink> Aggregator<S> {
    pub fn new(inner: S, channels: usize, quantum: f64) -> Self {
        Self {
            inner,
            quantum,
            window: 0,
            last: 0.0,
            acc: vec![0.0; channels],
            current: vec![0.0; channels],
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn window_end(&self) -> f64 {
        (self.window + 1) as f64 * self.quantum
    }
}

impl<S: SampleSink> SampleSink for Aggregator<S> {
    fn process(&mut self, chan: usize, time: f64, value: f64) -> Result<()> {
        while time >= self.window_end() {
            let end = self.window_end();
            let start = self.window as f64 * self.quantum;
            for i in 0..self.acc.len() {
                self.acc[i] += (end - self.last) * self.current[i];
                self.inner.process(i, start, self.acc[i] / self.quantum)?;
                self.acc[i] = 0.0;
            }
            self.last = end;
            self.window += 1;
        }
        for i in 0..self.acc.len() {
            self.acc[i] += (time - self.last) * self.current[i];
        }
        self.last = time;
        if let Some(c) = self.current.get_mut(chan) {
            *c = value;
        }
        Ok(())
    }
}
