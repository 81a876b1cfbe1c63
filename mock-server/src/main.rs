use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "5984".to_string());
    let addr = format!("127.0.0.1:{port}");

    let app = match (std::env::var("MOCK_COUCH_USER"), std::env::var("MOCK_COUCH_PASSWORD")) {
        (Ok(user), Ok(password)) => {
            tracing::info!(user = %user, "basic auth enabled");
            mock_server::app_with_credentials(&user, &password)
        }
        _ => mock_server::app(),
    };

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");
    mock_server::run(listener, app).await
}
