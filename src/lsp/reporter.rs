use crate::document::report::{ErrorReporter, ParseFailure};
use tokio::runtime::Handle;
use tower_lsp_server::{Client, ls_types::MessageType};

/// Forwards parse failures to the client's log as well as the local one.
#[derive(Debug, Clone)]
pub struct ClientReporter {
    client: Client,
}

impl ClientReporter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ErrorReporter for ClientReporter {
    fn report(&self, failure: &ParseFailure) {
        log::error!("parse failed for {failure}");
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        let message = format!("parse failed for {failure}");
        runtime.spawn(async move {
            client.log_message(MessageType::ERROR, message).await;
        });
    }
}
