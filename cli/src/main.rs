use tabpreview_cli::app::{CoreApp, exit_code};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = CoreApp::run().await {
        eprintln!("\nError: {:#}\n", e);
        std::process::exit(exit_code(&e));
    }
}
