//! Animated spinner for thinking indicator

use agentwire_core::subscriber::{EventContext, RunSubscriber};
use agentwire_core::ProtocolEvent;
use parking_lot::Mutex;
use std::io::{stdout, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const BARS: &[char] = &['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const NUM_BARS: usize = 8;
const FRAME_DURATION: Duration = Duration::from_millis(80);

/// An animated spinner that runs in the background
///
/// As a run subscriber it halts on the first event of the run, so streamed
/// output never interleaves with a spinner frame.
#[derive(Clone)]
pub struct Spinner {
    // Held while a frame is drawn.
    active: Arc<Mutex<bool>>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Spinner {
    /// Start a new spinner with the given message
    pub fn new(message: &str) -> Self {
        let active = Arc::new(Mutex::new(true));
        let frames_active = Arc::clone(&active);
        let message = message.to_string();

        let handle = tokio::spawn(async move {
            // Each bar has its own height (0-7) and velocity
            let mut heights = [3i8, 5, 4, 6, 3, 5, 4, 3];
            let mut velocities = [1i8, -1, 1, -1, 1, -1, 1, -1];

            loop {
                {
                    let active = frames_active.lock();
                    if !*active {
                        break;
                    }
                    let frame: String = smooth(&heights)
                        .iter()
                        .map(|&h| BARS[h as usize])
                        .collect();
                    print!("\r\x1b[2m{} {}\x1b[0m", frame, message);
                    let _ = stdout().flush();
                }

                // Bounce between 1 and 7
                for i in 0..NUM_BARS {
                    heights[i] += velocities[i];
                    if heights[i] <= 1 || heights[i] >= 7 {
                        velocities[i] = -velocities[i];
                        heights[i] = heights[i].clamp(1, 7);
                    }
                }
                tokio::time::sleep(FRAME_DURATION).await;
            }
        });

        Self {
            active,
            handle: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Stop drawing and clear the line. Safe to call more than once.
    pub fn halt(&self) {
        let mut active = self.active.lock();
        if *active {
            *active = false;
            print!("\r\x1b[2K");
            let _ = stdout().flush();
        }
    }

    /// Halt and wait for the animation task to exit
    pub async fn stop(self) {
        self.halt();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl RunSubscriber for Spinner {
    fn on_event(&mut self, _event: &ProtocolEvent, _ctx: &EventContext<'_>) {
        self.halt();
    }
}

/// Blend each bar slightly toward its neighbors: 60% self, 20% each side.
fn smooth(heights: &[i8; NUM_BARS]) -> [i8; NUM_BARS] {
    let mut smoothed = [0i8; NUM_BARS];
    for i in 0..NUM_BARS {
        let left = if i > 0 { heights[i - 1] } else { heights[i] };
        let right = if i < NUM_BARS - 1 {
            heights[i + 1]
        } else {
            heights[i]
        };
        smoothed[i] = ((heights[i] as i16 * 3 + left as i16 + right as i16) / 5) as i8;
    }
    smoothed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smooth_keeps_flat_heights() {
        assert_eq!(smooth(&[4; NUM_BARS]), [4; NUM_BARS]);
    }

    #[test]
    fn smooth_stays_within_bar_range() {
        let smoothed = smooth(&[1, 7, 1, 7, 1, 7, 1, 7]);
        assert!(smoothed.iter().all(|&h| (1..=7).contains(&h)));
    }

    #[tokio::test]
    async fn halt_is_idempotent_and_stop_joins() {
        let spinner = Spinner::new("thinking");
        let subscriber_copy = spinner.clone();
        subscriber_copy.halt();
        spinner.halt();
        assert!(!*spinner.active.lock());
        spinner.stop().await;
        assert!(subscriber_copy.handle.lock().is_none());
    }
}
