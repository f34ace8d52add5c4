//! Interactive first-run configuration.
//!
//! Uses dialoguer for terminal prompts. The questions go through the
//! [`Prompt`] trait so the flow can be driven by scripted answers in tests.

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use movescount_client::config::default_data_dir;
use movescount_client::{Config, ExportFormat, Paths, parse_formats};
use secrecy::SecretString;
use std::path::PathBuf;

pub trait Prompt {
    /// Ask for a line of text. An empty answer is allowed when no default is given.
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String>;
    fn password(&mut self, prompt: &str) -> Result<String>;
    fn message(&mut self, text: &str);
}

pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(prompt);
        input = match default {
            Some(d) => input.default(d.to_string()),
            None => input.allow_empty(true),
        };
        Ok(input.interact_text()?)
    }

    fn password(&mut self, prompt: &str) -> Result<String> {
        Ok(Password::new().with_prompt(prompt).interact()?)
    }

    fn message(&mut self, text: &str) {
        println!("{text}");
    }
}

/// Return the stored configuration, asking for it first when none exists or
/// when `force` is set.
pub fn configure(paths: &Paths, force: bool, prompt: &mut dyn Prompt) -> Result<Config> {
    std::fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("creating {}", paths.config_dir.display()))?;

    if force || !paths.config_file.exists() {
        let config = ask(prompt)?;
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating {}", config.data_dir.display()))?;
        prompt.message(&format!(
            "Storing configuration in {}",
            paths.config_file.display()
        ));
        config.save(&paths.config_file)?;
    }

    Config::load(&paths.config_file).context("loading configuration")
}

fn ask(prompt: &mut dyn Prompt) -> Result<Config> {
    let email = prompt.input("Movescount.com email address", None)?;
    let password = prompt.password("Password")?;

    let available = ExportFormat::ALL.map(ExportFormat::as_str).join(", ");
    let formats = loop {
        let answer = prompt.input(
            &format!("Formats to fetch, space-separated (available: {available})"),
            None,
        )?;
        match parse_formats(&answer) {
            Ok(formats) => break formats,
            Err(_) => prompt.message("Unable to recognize formats. Please try again."),
        }
    };

    let default_dir = default_data_dir();
    let data_dir = prompt.input(
        "Data storage path",
        Some(&*default_dir.to_string_lossy()),
    )?;
    let data_dir = if data_dir.trim().is_empty() {
        default_dir
    } else {
        PathBuf::from(data_dir.trim())
    };

    Ok(Config {
        email: email.trim().to_string(),
        password: SecretString::new(password.into()),
        formats,
        data_dir,
    })
}
