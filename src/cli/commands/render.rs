//! Render command - turn a text file into HTML with flag images

use crate::cli::args::RenderArgs;
use crate::codec;
use crate::config::Config;
use crate::dom::{Document, Dom, SharedDocument};
use crate::error::{FlagError, FlagResult};
use crate::fetch::{AssetFetcher, HttpFetcher};
use crate::session::{placeholder_style, FlagSession};
use crate::store::{FileStore, KeyValueStore};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Execute the render command
pub async fn execute(args: RenderArgs, config: &Config, store_dir: &Path) -> FlagResult<()> {
    if !args.input.exists() {
        return Err(FlagError::PathNotFound(args.input));
    }

    let text = fs::read_to_string(&args.input)
        .await
        .map_err(|e| FlagError::io(format!("reading {}", args.input.display()), e))?;

    debug!("Using store at {}", store_dir.display());
    let backend = Arc::new(FileStore::new(store_dir));
    let html = render_html(&text, config, backend, Arc::new(HttpFetcher::new())).await;

    match args.output {
        Some(path) => {
            fs::write(&path, html)
                .await
                .map_err(|e| FlagError::io(format!("writing {}", path.display()), e))?;
            info!("Wrote {}", path.display());
        }
        None => print!("{}", html),
    }

    Ok(())
}

/// Run a session over `text`, one paragraph per line, and serialize it
///
/// Session handles only live as long as the session, so resolved
/// placeholders are inlined as data URLs before it closes.
pub async fn render_html(
    text: &str,
    config: &Config,
    backend: Arc<dyn KeyValueStore>,
    fetcher: Arc<dyn AssetFetcher>,
) -> String {
    let dom = Dom::new().into_shared();
    let document: SharedDocument = dom.clone();
    let session = FlagSession::start(config, document, backend, fetcher).await;

    for line in text.lines() {
        let record = {
            let mut dom = dom.lock();
            let paragraph = dom.create_element("p");
            let content = dom.create_text(line);
            dom.append_child(paragraph, content);
            let root = dom.root();
            dom.append_child(root, paragraph)
        };
        session.notify(&[record]);
    }

    session.settle().await;

    let body = {
        let mut dom = dom.lock();
        let root = dom.root();
        let resolved = dom.elements_with_class(root, &config.markup.resolved_class());
        for element in resolved {
            let handle = dom
                .attribute(element, "src")
                .and_then(|src| session.resolver().registry().lookup(src));
            if let Some(handle) = handle {
                let inline = codec::encode_data_url(handle.bytes(), handle.content_type());
                dom.set_attribute(element, "src", &inline);
            }
        }
        dom.to_html(root)
    };

    session.close().await;

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{}</style>\n</head>\n{}\n</html>\n",
        placeholder_style(&config.markup),
        body
    )
}
