use axum::Router;
use clap::Parser;
use platter::cli::{
    Args, build_config, init_logging, load_jwt_secret, load_vault_key, validate_identity_url,
    validate_public_url,
};
use platter::create_app;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(jwt_secret) = load_jwt_secret(args.jwt_secret_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(vault_key) = load_vault_key(args.vault_key_file.as_deref()) else {
        std::process::exit(1);
    };

    let Some(public_url) = validate_public_url(&args.public_url) else {
        std::process::exit(1);
    };

    let Some(identity_url) = validate_identity_url(&args.identity_url) else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap();

    let config = build_config(&args, &public_url, identity_url, jwt_secret, vault_key);

    // The admin app's pages and business API mount here; the auth
    // middleware gates whatever the host router carries.
    let app = create_app(&config, Router::new());

    info!(address = %local_addr, "Listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
