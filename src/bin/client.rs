use dotenvy::dotenv;
use sentinel_chat::client;
use sentinel_chat::config::ClientConfig;
use std::io::Write;
use tracing_subscriber::{fmt, EnvFilter};


#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
dotenv().ok();
let cfg = <ClientConfig as clap::Parser>::parse();

// stdout carries the reply, so logs go to stderr and stay quiet by default
let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
fmt().with_env_filter(filter).with_writer(std::io::stderr).init();


let mut stream = match client::connect((cfg.host.as_str(), cfg.port)).await {
    Ok(stream) => stream,
    Err(e) => {
        tracing::debug!(error = %e, "connect failed");
        println!("{}", client::NO_RESPONSE);
        return Ok(());
    }
};

client::send(&mut stream, &cfg.message, |text| {
    print!("{text}");
    let _ = std::io::stdout().flush();
})
.await?;
println!();
Ok(())
}
