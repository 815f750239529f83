// Authenticated crawling: log in once before the crawl through the shared fetcher

use crate::target::Credentials;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;
use webscan_scanner::error::FetchError;
use webscan_scanner::fetch::{FetchRequest, Fetcher};
use webscan_scanner::parser::PageParser;
use webscan_scanner::result::{Form, Input};

#[derive(Error, Debug)]
pub enum LoginError {
    #[error("Login request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("No form with a password field on {0}")]
    NoLoginForm(String),

    #[error("Login endpoint answered with status {0}")]
    Rejected(u16),

    #[error("Login form is still shown after submitting credentials")]
    StillOnLoginPage,

    #[error("Invalid form action: {0}")]
    InvalidAction(String),
}

/// Establishes a session through `fetcher`. Cookies land in the fetcher's jar, so every
/// later request made through it is authenticated.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    async fn login(&self, fetcher: &dyn Fetcher, credentials: &Credentials) -> Result<(), LoginError>;
}

/// Fills and submits the HTML login form found at the login URL, keeping hidden fields
/// such as CSRF tokens.
pub struct FormLogin;

#[async_trait]
impl LoginFlow for FormLogin {
    async fn login(&self, fetcher: &dyn Fetcher, credentials: &Credentials) -> Result<(), LoginError> {
        let login_page = fetcher
            .fetch(FetchRequest::get(credentials.login_url.clone()))
            .await?;
        if !login_page.is_success() {
            return Err(LoginError::Rejected(login_page.status_code));
        }

        let facts = PageParser::parse(&login_page.body, &login_page.url);
        let form = facts
            .forms
            .into_iter()
            .find(Form::has_password_input)
            .ok_or_else(|| LoginError::NoLoginForm(login_page.url.clone()))?;

        let action = Url::parse(&form.action).map_err(|e| LoginError::InvalidAction(e.to_string()))?;
        let fields = fill_form(&form, credentials);
        debug!(
            "Submitting login form to {} with fields {:?}",
            action,
            fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>()
        );

        let request = if form.method == "post" {
            FetchRequest::post_form(action, fields)
        } else {
            let mut request = FetchRequest::get(action);
            request.params = fields;
            request
        };
        let response = fetcher.fetch(request).await?;

        if response.status_code >= 400 {
            return Err(LoginError::Rejected(response.status_code));
        }
        if response.is_html()
            && PageParser::parse(&response.body, &response.url)
                .forms
                .iter()
                .any(Form::has_password_input)
        {
            return Err(LoginError::StillOnLoginPage);
        }

        info!("Logged in as {}", credentials.username);
        Ok(())
    }
}

fn is_username_field(input: &Input) -> bool {
    matches!(input.input_type.as_str(), "text" | "email")
}

/// Form fields to submit: hidden and pre-filled inputs as-is, the password field and the
/// most likely username field filled in.
pub fn fill_form(form: &Form, credentials: &Credentials) -> Vec<(String, String)> {
    let named: Vec<(&str, &Input)> = form
        .inputs
        .iter()
        .filter_map(|i| i.name.as_deref().map(|n| (n, i)))
        .collect();

    // prefer a field that is called like a username, else the first text field
    let username_field = named
        .iter()
        .filter(|(_, i)| is_username_field(i))
        .find(|(name, _)| {
            let name = name.to_ascii_lowercase();
            ["user", "login", "email", "name"].iter().any(|hint| name.contains(hint))
        })
        .or_else(|| named.iter().find(|(_, i)| is_username_field(i)))
        .map(|(name, _)| *name);

    named
        .iter()
        .filter_map(|(name, input)| {
            let value = if input.input_type == "password" {
                credentials.password.clone()
            } else if Some(*name) == username_field {
                credentials.username.clone()
            } else if matches!(input.input_type.as_str(), "checkbox" | "radio" | "button") {
                return None;
            } else {
                input.value.clone().unwrap_or_default()
            };
            Some((name.to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, input_type: &str, value: Option<&str>) -> Input {
        Input {
            name: Some(name.to_string()),
            input_type: input_type.to_string(),
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn test_fill_form_keeps_csrf_and_fills_credentials() {
        let form = Form {
            action: "https://a.test/login".into(),
            method: "post".into(),
            inputs: vec![
                input("csrf_token", "hidden", Some("t0k3n")),
                input("search", "text", None),
                input("user_login", "text", None),
                input("pass", "password", None),
                input("remember", "checkbox", Some("1")),
                input("go", "submit", Some("Log in")),
            ],
        };
        let credentials = Credentials {
            login_url: Url::parse("https://a.test/login").unwrap(),
            username: "admin".into(),
            password: "hunter2".into(),
        };

        let fields = fill_form(&form, &credentials);
        assert_eq!(
            fields,
            vec![
                ("csrf_token".to_string(), "t0k3n".to_string()),
                ("search".to_string(), String::new()),
                ("user_login".to_string(), "admin".to_string()),
                ("pass".to_string(), "hunter2".to_string()),
                ("go".to_string(), "Log in".to_string()),
            ]
        );
    }
}
