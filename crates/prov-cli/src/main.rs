use clap::Parser;
use prov_cli::{run, Cli};
use prov_core::{ErrorClass, ProvenanceError};
use tracing_subscriber::EnvFilter;

fn main() {
    // Cargar .env si existe (PROV_*, DATABASE_URL)
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                             .with_writer(std::io::stderr)
                             .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("[prov] cannot render report: {e}");
                std::process::exit(5);
            }
        },
        Err(e) => {
            eprintln!("[prov] {e:#}");
            // 4: estado/precondición, 5: backend u otro fallo
            let code = match e.downcast_ref::<ProvenanceError>().map(ProvenanceError::class) {
                Some(ErrorClass::NotFound | ErrorClass::InvariantViolation | ErrorClass::TypeMismatch) => 4,
                _ => 5,
            };
            std::process::exit(code);
        }
    }
}
