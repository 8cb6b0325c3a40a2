use feed_worker::app::App;
use feed_worker::config::Config;
use feed_worker::error::{AppError, Result};
use feed_worker::models::ProxyMode;
use tokio::io::AsyncReadExt;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries protocol responses
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = Config::load()?;
    let app = App::new(&config).await?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => app.serve_stdio().await?,

        // Headless refresh of every feed that is due
        ["--refresh"] => {
            let refreshed = app.refresh_due_feeds().await?;
            println!("Refreshed {} feeds", refreshed);
        }

        ["--add", url] => print_added(&app, url, ProxyMode::None).await?,
        ["--add", url, "--relay"] => print_added(&app, url, ProxyMode::CorsRelay).await?,

        // Entry HTML on stdin, rewritten HTML on stdout
        ["--rewrite", feed_config_id] => {
            let feed_config_id = feed_config_id
                .parse::<i64>()
                .map_err(|e| AppError::Validation(format!("invalid feed id: {e}")))?;
            let mut html = String::new();
            tokio::io::stdin().read_to_string(&mut html).await?;
            println!("{}", app.rewrite_entry_html(feed_config_id, &html).await?);
        }

        _ => {
            return Err(AppError::Validation(
                "usage: feed-worker [--refresh | --add <url> [--relay] | --rewrite <feed-id>]".to_string(),
            ))
        }
    }

    Ok(())
}

async fn print_added(app: &App, url: &str, proxy: ProxyMode) -> Result<()> {
    let feed = app.add_feed(url, proxy).await?;
    println!("Added feed {}: {}", feed.id, feed.title);
    Ok(())
}
