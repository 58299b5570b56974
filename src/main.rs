use leco_coordinator::print::{self, Printout};
use leco_coordinator::{actor, config};
use tokio::signal;

const PRINT_CHANNEL_CAPACITY: usize = 1_000;

#[tokio::main]
async fn main() {
    let config = config::parse();
    let verbose = config.verbose;

    let (print_tx, print_rx) = print::make_print_channel(PRINT_CHANNEL_CAPACITY);
    let print_task = tokio::spawn(print::print_task(print_rx, verbose));

    let run_result = tokio::select! {
        result = actor::run(config, print_tx.clone()) => result,
        _ = signal::ctrl_c() => {
            let _ = print_tx.send(Printout::new(0, "leco-coordinator: received interrupt, shutting down".to_string())).await;
            Ok(())
        }
    };

    drop(print_tx);
    let _ = print_task.await;

    if let Err(e) = run_result {
        eprintln!("leco-coordinator: fatal error: {e:?}");
        std::process::exit(1);
    }
}
