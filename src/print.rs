//! Diagnostic output channel.
//!
//! Every task (R connections, dealers, the actor, the cleaner) sends a
//! [`Printout`] here instead of writing to stdout directly, so the many
//! concurrent tasks never contend over a shared writer.

use tokio::sync::mpsc;

pub type PrintSender = mpsc::Sender<Printout>;
pub type PrintReceiver = mpsc::Receiver<Printout>;

/// A diagnostic line. Verbosity 0 is always shown; 1 only when verbose
/// mode is on. Numbers greater than 1 are reserved for future use.
#[derive(Debug, Clone)]
pub struct Printout {
    pub verbosity: u8,
    pub content: String,
}

impl Printout {
    pub fn new(verbosity: u8, content: impl Into<String>) -> Self {
        Printout {
            verbosity,
            content: content.into(),
        }
    }
}

pub fn make_print_channel(depth: usize) -> (PrintSender, PrintReceiver) {
    mpsc::channel(depth)
}

/// Drains printouts until the sender side is dropped, showing each line
/// that clears the configured verbosity threshold.
pub async fn print_task(mut print_rx: PrintReceiver, verbose: bool) {
    while let Some(printout) = print_rx.recv().await {
        let show = match printout.verbosity {
            0 => true,
            1 => verbose,
            _ => verbose,
        };
        if show {
            println!("{}", printout.content);
        }
    }
}
