// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{config, Answer, TOKEN};

use anyhow::Result;
use mygit::{
    check_token,
    forge::{ForgeError, HostingApi, HttpClient, HttpResponse},
    ConnectorError, SecretToken,
};
use pretty_assertions::assert_eq;

struct FixedResponse {
    status: u16,
    body: &'static str,
}

impl HttpClient for FixedResponse {
    async fn get(&self, url: &str, token: &SecretToken) -> Result<HttpResponse, ForgeError> {
        assert_eq!(url, "https://api.example.com/user");
        assert_eq!(token.expose(), TOKEN);
        Ok(HttpResponse {
            status: self.status,
            body: self.body.to_string(),
        })
    }
}

fn api(status: u16, body: &'static str) -> HostingApi<FixedResponse> {
    HostingApi::new(FixedResponse { status, body }, "https://api.example.com")
}

#[tokio::test]
async fn check_token_accepts_own_token() -> Result<()> {
    let answer = Answer::no();
    check_token(&api(200, r#"{"login": "alice"}"#), &config("/tmp"), &answer).await?;
    assert!(answer.asked().is_empty());

    Ok(())
}

#[tokio::test]
async fn check_token_rejected_token() {
    let result = check_token(&api(401, "{}"), &config("/tmp"), &Answer::yes()).await;
    match result {
        Err(error @ ConnectorError::InvalidToken { .. }) => {
            assert_eq!(error.exit_code(), 1);
            assert!(!error.to_string().contains(TOKEN));
        }
        other => panic!("expected invalid token, got {other:?}"),
    }
}

#[tokio::test]
async fn check_token_other_login_only_warns_by_default() -> Result<()> {
    let answer = Answer::no();
    check_token(&api(200, r#"{"login": "bob"}"#), &config("/tmp"), &answer).await?;
    assert!(answer.asked().is_empty());

    Ok(())
}

#[tokio::test]
async fn check_token_other_login_asks_when_configured() {
    let mut config = config("/tmp");
    config.confirm_identity_mismatch = true;
    let answer = Answer::no();

    let result = check_token(&api(200, r#"{"login": "bob"}"#), &config, &answer).await;
    assert!(matches!(result, Err(ConnectorError::AbortedByUser)));
    assert_eq!(answer.asked(), vec!["Continue as bob?".to_string()]);
}
