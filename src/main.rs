use dotenv::dotenv;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use menu_reorder::{
    engine::Config,
    gateway::{HttpGateway, InMemoryGateway, PersistenceGateway},
    types::{MenuEntry, MenuKind, MenuNode},
    utils::{env_duration, pretty_print_tree},
    ReorderEngine,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();

    let file_appender = tracing_appender::rolling::daily("logs", "menu-reorder.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().json().with_writer(file_writer))
        .init();

    let config = Config::from_env()?;
    info!(scope = %config.scope, "Starting menu reorder session");

    match dotenv::var("GATEWAY_URL") {
        Ok(url) => {
            let timeout = env_duration("GATEWAY_TIMEOUT")?.unwrap_or(Duration::from_secs(10));
            info!(url = %url, ?timeout, "Using HTTP gateway");
            run(Arc::new(HttpGateway::<MenuEntry>::new(url, timeout)?), config).await
        }
        Err(_) => {
            info!("GATEWAY_URL not set, using in-memory demo store");
            let gateway = InMemoryGateway::new();
            gateway.seed(&config.scope, demo_menu());
            run(Arc::new(gateway), config).await
        }
    }
}

/// Loads the menu, expands the first entry and moves the last root entry to the top.
async fn run<G>(gateway: Arc<G>, config: Config) -> eyre::Result<()>
where
    G: PersistenceGateway<MenuEntry> + 'static,
{
    let engine = ReorderEngine::new(gateway, config);
    engine.reload().await?;
    pretty_print_tree(&engine.tree());

    let roots = engine.tree().roots().to_vec();
    if let Some(&first) = roots.first() {
        let outcome = engine.expand(first).await;
        info!(node = %first, ?outcome, "Expanded first entry");
    }

    if let (Some(&first), Some(&last)) = (roots.first(), roots.last()) {
        if first != last {
            engine.drag_start(last);
            engine.drag_over(first);
            match engine.drop_on(Some(first)).await {
                Ok(outcome) => info!(?outcome, "Drop finished"),
                Err(e) => warn!(error = %e, "Reorder rolled back"),
            }
        }
    }

    pretty_print_tree(&engine.tree());

    let stats = engine.stats();
    info!(
        previews = stats.previews,
        commits = stats.commits,
        rollbacks = stats.rollbacks,
        fetches = stats.fetches,
        fetch_failures = stats.fetch_failures,
        last_commit_at = ?stats.last_commit_at,
        "Session statistics"
    );
    Ok(())
}

fn demo_menu() -> Vec<MenuNode<MenuEntry>> {
    let entry = |id: u64, label: &str, kind: MenuKind| MenuNode::new(id, MenuEntry::new(label, kind));
    vec![
        entry(1, "Dashboard", MenuKind::Page),
        entry(2, "Content", MenuKind::Directory).with_children(vec![
            entry(20, "Articles", MenuKind::Page),
            entry(21, "Categories", MenuKind::Page),
            entry(22, "Tags", MenuKind::Page),
        ]),
        entry(3, "Settings", MenuKind::Directory).with_children(vec![
            entry(30, "Users", MenuKind::Page),
            entry(31, "Roles", MenuKind::Page),
        ]),
        entry(4, "Help", MenuKind::Link),
    ]
}
