//! Interactive authorization-code capability
//!
//! The one unbounded wait in the pipeline: the operator visits the
//! authorize URL in a browser and supplies the resulting code. Modeled as
//! a trait so tests (and embedders with their own UI) can supply a canned
//! code without a terminal.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{Error, Result};

/// Channel through which the operator supplies an authorization code.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    /// Present `authorize_url` and wait for the code. No timeout.
    async fn obtain_code(&self, authorize_url: &str) -> Result<String>;
}

/// Prints the URL and reads the code from stdin.
pub struct TerminalPrompt;

#[async_trait]
impl AuthorizationPrompt for TerminalPrompt {
    async fn obtain_code(&self, authorize_url: &str) -> Result<String> {
        println!();
        println!("Open in a web browser: {}", authorize_url);
        println!("Paste the authorization code and press enter:");

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Prompt(e.to_string()))?;

        let code = line.trim();
        if code.is_empty() {
            return Err(Error::Prompt("empty authorization code".to_string()));
        }
        Ok(code.to_string())
    }
}
