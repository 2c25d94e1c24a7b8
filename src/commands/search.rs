//! `quire search` against the literature API

use crate::config::Config;
use crate::error::Result;
use crate::literature::LiteratureClient;
use colored::Colorize;
use prettytable::{format, Table};

/// Search the literature API and print a table of papers
pub async fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    let client = LiteratureClient::from_config(&config.literature)?;
    let papers = client.search_papers(query, limit).await?;

    if papers.is_empty() {
        println!("{}", "No papers found.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Year".bold(),
        "Title".bold(),
        "Authors".bold(),
        "ID".bold()
    ]);

    for paper in &papers {
        let year = paper
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(prettytable::row![
            year,
            paper.title,
            paper.author_names(),
            paper.paper_id.cyan()
        ]);
    }

    println!("\nResults for '{}':", query);
    table.printstd();
    println!();
    Ok(())
}
