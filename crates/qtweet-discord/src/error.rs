#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("discord token is empty")]
    MissingToken,

    #[error("discord rejected the token")]
    Unauthorized,

    #[error("discord HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("discord request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("discord websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("discord sent invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("discord gateway: {0}")]
    Gateway(String),

    #[error("discord gateway not ready after {0:?}")]
    Timeout(std::time::Duration),
}
