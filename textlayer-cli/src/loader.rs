use std::sync::Arc;

use anyhow::Result;
use textlayer_core::{DocumentView, PageTextContent, RenderTicket, TextSource};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};

/// Text extracted for one ticket, sent back to the owner of the view.
pub struct RenderOutcome {
    pub ticket: RenderTicket,
    pub result: Result<PageTextContent>,
}

/// Extracts each ticket's page on the blocking pool. Tickets cancelled
/// before their turn are skipped.
pub fn spawn_renders(
    source: &Arc<dyn TextSource>,
    tickets: Vec<RenderTicket>,
    tx: &UnboundedSender<RenderOutcome>,
) {
    for ticket in tickets {
        let source = Arc::clone(source);
        let tx = tx.clone();
        tokio::task::spawn_blocking(move || {
            if ticket.token.is_cancelled() {
                debug!(page = ticket.page_number, "skipping cancelled render");
                return;
            }
            let result = source.text_content(ticket.page_number);
            // The receiver is gone once the viewer exits.
            let _ = tx.send(RenderOutcome { ticket, result });
        });
    }
}

/// Hands a finished extraction to the view. Returns whether the view
/// changed.
pub fn apply_outcome(view: &mut DocumentView, outcome: RenderOutcome) -> bool {
    let RenderOutcome { ticket, result } = outcome;
    match result {
        Ok(content) => match view.complete_render(&ticket, content) {
            Ok(applied) => applied,
            Err(err) => {
                warn!(page = ticket.page_number, %err, "text layer rejected");
                true
            }
        },
        Err(err) => view.fail_render(&ticket, format!("{err:#}")),
    }
}

/// Renders `pages` concurrently and waits for all of them.
pub async fn render_pages(
    view: &mut DocumentView,
    source: &Arc<dyn TextSource>,
    pages: impl IntoIterator<Item = usize>,
) -> Result<()> {
    let tickets = pages
        .into_iter()
        .map(|page| view.begin_render(page))
        .collect::<Result<Vec<_>, _>>()?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    spawn_renders(source, tickets, &tx);
    drop(tx);
    while let Some(outcome) = rx.recv().await {
        apply_outcome(view, outcome);
    }
    Ok(())
}
