//! Chat bot front end
//!
//! [`respond`] holds the whole dialogue and knows nothing about the chat
//! transport; [`telegram::TelegramBot`] feeds it messages from the Telegram
//! Bot API.

pub mod telegram;

pub use telegram::TelegramBot;

use crate::models::{Artikul, Product};
use crate::sync::{SyncError, Synchronizer};

/// Text of the single reply-keyboard button
pub const GET_PRODUCT_BUTTON: &str = "Get product data";

pub const GREETING: &str =
    "Hi! I look up product data on Wildberries. Press the button below to start.";
pub const ASK_ARTIKUL: &str = "Enter the product artikul:";
pub const INVALID_ARTIKUL: &str = "Please enter a valid artikul (a positive number).";
pub const PRODUCT_ADDED: &str = "Product successfully added to the database.";
pub const NOT_FOUND: &str = "No product with this artikul was found on Wildberries.";
pub const UPSTREAM_DOWN: &str =
    "Wildberries is not responding right now. Please try again later.";
pub const INTERNAL_FAILURE: &str =
    "Something went wrong while loading the product. Please try again later.";

/// One outgoing chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// Attach the "Get product data" reply keyboard
    pub show_keyboard: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            show_keyboard: false,
        }
    }

    fn with_keyboard(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            show_keyboard: true,
        }
    }
}

/// Produce the replies for one incoming message
pub async fn respond(text: &str, sync: &Synchronizer) -> Vec<Reply> {
    let text = text.trim();

    if text == "/start" || text.starts_with("/start ") {
        return vec![Reply::with_keyboard(GREETING)];
    }
    if text == GET_PRODUCT_BUTTON {
        return vec![Reply::text(ASK_ARTIKUL)];
    }

    let Some(artikul) = parse_artikul(text) else {
        return vec![Reply::text(INVALID_ARTIKUL)];
    };

    match sync.resolve(artikul).await {
        Ok(resolved) => {
            let mut replies = Vec::with_capacity(2);
            if resolved.newly_created {
                replies.push(Reply::text(PRODUCT_ADDED));
            }
            replies.push(Reply::text(render_product(&resolved.product)));
            replies
        }
        Err(SyncError::ItemNotFound(_)) => vec![Reply::text(NOT_FOUND)],
        Err(SyncError::UpstreamUnavailable(e)) => {
            tracing::warn!(artikul, error = %e, "Bot lookup failed: catalog unavailable");
            vec![Reply::text(UPSTREAM_DOWN)]
        }
        Err(e) => {
            tracing::error!(artikul, error = %e, "Bot lookup failed");
            vec![Reply::text(INTERNAL_FAILURE)]
        }
    }
}

/// Positive integer artikul, or None
pub fn parse_artikul(text: &str) -> Option<Artikul> {
    text.trim().parse::<Artikul>().ok().filter(|a| *a > 0)
}

/// Plain-text product summary
pub fn render_product(product: &Product) -> String {
    format!(
        "Name: {}\nArtikul: {}\nPrice: {} RUB\nRating: {}\nIn stock: {}",
        product.name,
        product.artikul,
        product.price_display(),
        product.rating,
        product.stock_quantity
    )
}
