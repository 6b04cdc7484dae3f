//! Interactive console client for a running gateway.
//!
//! A menu-driven loop over the HTTP API: authenticate, manage the
//! server-side array, trigger sorts. Successful sort responses are
//! appended to a local history log so runs can be reviewed offline.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{theme::ColorfulTheme, Input, Password, Select};
use serde_json::Value;
use std::path::{Path, PathBuf};

const MENU_ITEMS: &[&str] = &[
    "Register",
    "Log in",
    "Upload array",
    "Generate random array",
    "Add elements",
    "Show array",
    "Sort",
    "Show sort history",
    "Delete array",
    "Log out",
    "Quit",
];

struct ClientSession {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    login: Option<String>,
    history_path: PathBuf,
}

/// Run the interactive menu loop against `server`.
pub async fn run_client(server: &str, data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let mut session = ClientSession {
        http: reqwest::Client::new(),
        base_url: server.trim_end_matches('/').to_owned(),
        token: None,
        login: None,
        history_path: data_dir.join("sort_history.log"),
    };

    println!("Using server: {}", style(&session.base_url).cyan());

    loop {
        let choice = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Pick an action")
            .items(MENU_ITEMS)
            .default(0)
            .interact()?;

        let result = match choice {
            0 => session.register().await,
            1 => session.log_in().await,
            2 => session.upload_array().await,
            3 => session.generate_array().await,
            4 => session.add_elements().await,
            5 => session.show_array().await,
            6 => session.sort_array().await,
            7 => session.show_history(),
            8 => session.delete_array().await,
            9 => session.log_out().await,
            _ => return Ok(()),
        };

        if let Err(e) = result {
            println!("{} {e:#}", style("Error:").red());
        }
        println!();
    }
}

impl ClientSession {
    async fn register(&mut self) -> Result<()> {
        let (login, password) = read_credentials()?;
        let (status, body) = self
            .post("/auth/register", &serde_json::json!({"login": login, "password": password}), false)
            .await?;

        if status.is_success() {
            self.token = body["token"].as_str().map(str::to_owned);
            self.login = Some(login);
        }
        print_response("Register", status, &body);
        Ok(())
    }

    async fn log_in(&mut self) -> Result<()> {
        let (login, password) = read_credentials()?;
        let (status, body) = self
            .post("/auth/login", &serde_json::json!({"login": login, "password": password}), false)
            .await?;

        if status.is_success() {
            self.token = body["token"].as_str().map(str::to_owned);
            self.login = Some(login);
        }
        print_response("Log in", status, &body);
        Ok(())
    }

    async fn upload_array(&self) -> Result<()> {
        self.require_session()?;
        let line: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Numbers separated by spaces (empty to upload a file)")
            .allow_empty(true)
            .interact_text()?;

        let payload = if line.trim().is_empty() {
            let path: String = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Absolute path to a number file")
                .interact_text()?;
            serde_json::json!({"sourceFilePath": path})
        } else {
            serde_json::json!({"numbers": parse_numbers(&line)?})
        };

        let (status, body) = self.post("/array/upload", &payload, true).await?;
        print_response("Upload", status, &body);
        Ok(())
    }

    async fn generate_array(&self) -> Result<()> {
        self.require_session()?;
        let length: usize = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Length (1-100000)")
            .interact_text()?;
        let min_value: i64 = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Minimum value")
            .interact_text()?;
        let max_value: i64 = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Maximum value")
            .interact_text()?;

        let payload =
            serde_json::json!({"length": length, "minValue": min_value, "maxValue": max_value});
        let (status, body) = self.post("/array/generate", &payload, true).await?;
        print_response("Generate", status, &body);
        Ok(())
    }

    async fn add_elements(&self) -> Result<()> {
        self.require_session()?;
        let placements = ["Start", "End", "AfterIndex"];
        let placement = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Placement")
            .items(&placements)
            .default(1)
            .interact()?;

        let after_index: Option<i64> = if placements[placement] == "AfterIndex" {
            let index: i64 = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Insert after index (-1 for the start)")
                .interact_text()?;
            Some(index)
        } else {
            None
        };

        let line: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Values separated by spaces")
            .interact_text()?;
        let values = parse_numbers(&line)?;

        let payload = serde_json::json!({
            "placement": placements[placement],
            "afterIndex": after_index,
            "values": values,
        });
        let (status, body) = self.post("/array/add", &payload, true).await?;
        print_response("Add elements", status, &body);
        Ok(())
    }

    async fn show_array(&self) -> Result<()> {
        self.require_session()?;
        let (status, body) = self.get("/array").await?;
        print_response("Current array", status, &body);
        Ok(())
    }

    async fn sort_array(&self) -> Result<()> {
        self.require_session()?;
        let range_start = read_optional_bound("Range start (empty for none)")?;
        let range_end = read_optional_bound("Range end (empty for none)")?;

        let payload = serde_json::json!({"rangeStart": range_start, "rangeEnd": range_end});
        let (status, body) = self.post("/sort", &payload, true).await?;

        if status.is_success() {
            self.append_history(&body)?;
        }
        print_response("Sort", status, &body);
        Ok(())
    }

    fn show_history(&self) -> Result<()> {
        if !self.history_path.exists() {
            println!("No sort history yet.");
            return Ok(());
        }
        let contents = std::fs::read_to_string(&self.history_path)?;
        println!("Sort history:");
        for line in contents.lines() {
            println!("{line}");
        }
        Ok(())
    }

    async fn delete_array(&self) -> Result<()> {
        self.require_session()?;
        let (status, body) = self.delete("/array").await?;
        print_response("Delete array", status, &body);
        Ok(())
    }

    async fn log_out(&mut self) -> Result<()> {
        self.require_session()?;
        let (status, body) = self.post("/auth/logout", &serde_json::json!({}), true).await?;
        print_response("Log out", status, &body);
        self.token = None;
        self.login = None;
        Ok(())
    }

    fn require_session(&self) -> Result<&str> {
        self.token.as_deref().context("Log in first")
    }

    async fn post(
        &self,
        path: &str,
        payload: &Value,
        authorized: bool,
    ) -> Result<(reqwest::StatusCode, Value)> {
        let mut request = self.http.post(format!("{}{path}", self.base_url)).json(payload);
        if authorized {
            request = request.bearer_auth(self.require_session()?);
        }
        Self::exchange(request).await
    }

    async fn get(&self, path: &str) -> Result<(reqwest::StatusCode, Value)> {
        let request = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(self.require_session()?);
        Self::exchange(request).await
    }

    async fn delete(&self, path: &str) -> Result<(reqwest::StatusCode, Value)> {
        let request = self
            .http
            .delete(format!("{}{path}", self.base_url))
            .bearer_auth(self.require_session()?);
        Self::exchange(request).await
    }

    async fn exchange(request: reqwest::RequestBuilder) -> Result<(reqwest::StatusCode, Value)> {
        let response = request
            .send()
            .await
            .context("Request failed — is the gateway running?")?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    fn append_history(&self, body: &Value) -> Result<()> {
        use std::io::Write;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let line = format!(
            "{} | id={} | user={} | {body}",
            chrono::Utc::now().to_rfc3339(),
            &id[..6],
            self.login.as_deref().unwrap_or("?"),
        );
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.history_path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

fn read_credentials() -> Result<(String, String)> {
    let login: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Login")
        .interact_text()?;
    let password = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Password")
        .interact()?;
    Ok((login.trim().to_owned(), password))
}

fn read_optional_bound(prompt: &str) -> Result<Option<i64>> {
    let line: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<i64>()
        .map(Some)
        .with_context(|| format!("\"{trimmed}\" is not an integer"))
}

/// Parse whitespace/comma/semicolon-separated integers from user input.
fn parse_numbers(line: &str) -> Result<Vec<i64>> {
    let mut numbers = Vec::new();
    for field in line
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|field| !field.is_empty())
    {
        let value = field
            .parse::<i64>()
            .with_context(|| format!("\"{field}\" is not an integer"))?;
        numbers.push(value);
    }
    if numbers.is_empty() {
        anyhow::bail!("No numbers given");
    }
    Ok(numbers)
}

/// Print a response, hiding bodies that carry a session token.
fn print_response(action: &str, status: reqwest::StatusCode, body: &Value) {
    let label = format!("[{action}] {status}");
    if status.is_success() {
        println!("{}", style(label).green());
    } else {
        println!("{}", style(label).red());
    }

    if body.get("token").is_some() {
        println!("Session token received.");
    } else if !body.is_null() {
        println!("{body}");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_numbers_handles_separators() {
        assert_eq!(parse_numbers("1, 2; 3\t4").unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn parse_numbers_rejects_garbage_and_empty() {
        assert!(parse_numbers("1 two").is_err());
        assert!(parse_numbers("   ").is_err());
    }
}
