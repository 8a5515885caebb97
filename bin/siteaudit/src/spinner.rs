//! Terminal progress spinner for the long extraction and audit phases.

use std::io::Write;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_DELAY: Duration = Duration::from_millis(100);

/// A simple terminal loading animation. Dropped without `stop`, the
/// drawing task ends on its own.
pub struct Spinner {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let message = message.into();
        let (stop, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut frame = 0usize;
            loop {
                match stopped.try_recv() {
                    Ok(()) | Err(oneshot::error::TryRecvError::Closed) => {
                        print!("\r✅ {}\n", message);
                        let _ = std::io::stdout().flush();
                        return;
                    }
                    Err(oneshot::error::TryRecvError::Empty) => {}
                }

                print!("\r{} {}", FRAMES[frame % FRAMES.len()], message);
                let _ = std::io::stdout().flush();
                frame += 1;
                tokio::time::sleep(FRAME_DELAY).await;
            }
        });

        Self { stop, handle }
    }

    pub async fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.handle.await;
    }
}
