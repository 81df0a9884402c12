use std::sync::Arc;

use clap::Args;
use eyre::{eyre, Result};
use riverwatch::dataset::Dataset;
use riverwatch::summary::summarize;
use riverwatch::{http, Config, InsightClient, InsightRequest, Provider, CATEGORIES};

use crate::io::{Input, Output};

#[derive(Args, Debug)]
pub struct Opts {
    /// LLM provider: openai or deepseek
    #[clap(long, default_value = "openai")]
    provider: Provider,

    /// Free-form question about the data
    #[clap(long, conflicts_with_all = ["category", "index"])]
    prompt: Option<String>,

    /// Preset category (1-based, see --list) [default: 1]
    #[clap(long, requires = "index")]
    category: Option<usize>,

    /// Preset question within the category (1-based)
    #[clap(long)]
    index: Option<usize>,

    /// List the preset questions and exit
    #[clap(long)]
    list: bool,

    /// Output file [default: stdout]
    #[clap(long, default_value = "stdout")]
    output: String,

    /// Input CSV file [default: stdin]
    #[clap(default_value = "stdin")]
    input: String,
}

pub async fn insight(opts: &Opts, config: &Config) -> Result<()> {
    let mut output = Output::from_filename(&opts.output).await?;
    if opts.list {
        return output.emit(list_presets().as_bytes()).await;
    }

    let (prompt, category) = resolve_prompt(opts)?;

    let rows = Input::from_filename(&opts.input).await?.read_rows().await?;
    let dataset = Dataset::from_rows(rows);
    let summary = summarize(&dataset.rows, &dataset.schema);

    let request = InsightRequest {
        prompt,
        category,
        payload: serde_json::to_value(&summary)?,
    };
    let client = InsightClient::new(Arc::new(http::client()), config.llm.clone(), config.retry);
    let answer = client.ask(opts.provider, &request).await?;
    output.emit(format!("{answer}\n").as_bytes()).await
}

/// Pick the question to ask. Only preset questions carry their category.
fn resolve_prompt(opts: &Opts) -> Result<(String, Option<String>)> {
    if let Some(prompt) = &opts.prompt {
        return Ok((prompt.clone(), None));
    }
    let Some(index) = opts.index else {
        eyre::bail!("pass --prompt or --index");
    };
    let c = opts.category.unwrap_or(1);
    let category = CATEGORIES
        .get(c.wrapping_sub(1))
        .ok_or_else(|| eyre!("no category {}; see --list", c))?;
    let prompt = category
        .prompts
        .get(index.wrapping_sub(1))
        .ok_or_else(|| eyre!("no question {} in {}", index, category.label))?;
    Ok((prompt.to_string(), Some(category.label.to_string())))
}

fn list_presets() -> String {
    let mut out = String::new();
    for (c, category) in CATEGORIES.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", c + 1, category.label));
        for (i, prompt) in category.prompts.iter().enumerate() {
            out.push_str(&format!("   {}. {}\n", i + 1, prompt));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        opts: Opts,
    }

    fn parse(args: &[&str]) -> Opts {
        Cli::try_parse_from(std::iter::once("insight").chain(args.iter().copied()))
            .unwrap()
            .opts
    }

    #[test]
    fn free_prompt_has_no_category() {
        let opts = parse(&["--prompt", "Is the river healthy?"]);
        let (prompt, category) = resolve_prompt(&opts).unwrap();
        assert_eq!(prompt, "Is the river healthy?");
        assert_eq!(category, None);
    }

    #[test]
    fn preset_carries_its_category() {
        let (prompt, category) = resolve_prompt(&parse(&["--index", "1"])).unwrap();
        assert_eq!(prompt, CATEGORIES[0].prompts[0]);
        assert_eq!(category.as_deref(), Some("Trend and Behavior Insights"));

        let (_, category) = resolve_prompt(&parse(&["--category", "4", "--index", "1"])).unwrap();
        assert_eq!(category.as_deref(), Some("Performance Summary"));
    }

    #[test]
    fn bad_preset_choices_fail() {
        assert!(resolve_prompt(&parse(&[])).is_err());
        assert!(resolve_prompt(&parse(&["--category", "9", "--index", "1"])).is_err());
        assert!(resolve_prompt(&parse(&["--index", "99"])).is_err());
        let conflict = Cli::try_parse_from(["insight", "--prompt", "why?", "--category", "2"]);
        assert!(conflict.is_err());
    }

    #[test]
    fn presets_are_numbered() {
        let list = list_presets();
        assert!(list.starts_with("1. Trend and Behavior Insights\n   1. "));
        assert!(list.contains("4. Performance Summary\n"));
    }
}
