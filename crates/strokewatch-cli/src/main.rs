//! StrokeWatch CLI
//!
//! A command-line client for the StrokeWatch service: request risk
//! predictions, use the community board and check service health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{board, predict, status};
use std::path::PathBuf;

/// StrokeWatch CLI
#[derive(Parser)]
#[command(name = "sw")]
#[command(author, version, about = "CLI for the StrokeWatch stroke risk service", long_about = None)]
pub struct Cli {
    /// Service URL (can also be set via SW_API_URL env var)
    #[arg(long, env = "SW_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request a stroke risk prediction
    #[command(subcommand)]
    Predict(PredictCommands),

    /// Read and write the community board
    #[command(subcommand)]
    Board(BoardCommands),

    /// Show service health and readiness
    Status,
}

#[derive(Subcommand)]
pub enum PredictCommands {
    /// Predict from questionnaire answers
    Tabular {
        /// Age in years
        #[arg(long)]
        age: f32,

        /// Diagnosed hypertension (0 or 1)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
        hypertension: u8,

        /// Diagnosed heart disease (0 or 1)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
        heart_disease: u8,

        /// Weight in kilograms
        #[arg(long)]
        weight: f32,

        /// Height in centimetres
        #[arg(long)]
        height: f32,
    },

    /// Predict from a face photo (png, jpg, jpeg or gif)
    Image {
        /// Image file to upload
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum BoardCommands {
    /// List posts
    List {
        /// Only show one category (free_talk, rehabilitation_reviews, others)
        #[arg(long, short)]
        category: Option<String>,
    },

    /// Show posts per category
    Categories,

    /// Show a single post
    Show { category: String, id: u64 },

    /// Create a post
    Post {
        #[arg(long, short)]
        title: String,

        #[arg(long, default_value = "")]
        content: String,

        #[arg(long, short, default_value = "free_talk")]
        category: String,
    },

    /// Like a post
    Like { category: String, id: u64 },

    /// Delete a post
    Delete { category: String, id: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Predict(predict_cmd) => match predict_cmd {
            PredictCommands::Tabular {
                age,
                hypertension,
                heart_disease,
                weight,
                height,
            } => {
                let input = client::TabularInput {
                    age,
                    hypertension,
                    heart_disease,
                    weight_kg: weight,
                    height_cm: height,
                };
                predict::predict_tabular(&client, &input, cli.format).await?;
            }
            PredictCommands::Image { file } => {
                predict::predict_image(&client, &file, cli.format).await?;
            }
        },
        Commands::Board(board_cmd) => match board_cmd {
            BoardCommands::List { category } => {
                board::list_posts(&client, category.as_deref(), cli.format).await?;
            }
            BoardCommands::Categories => {
                board::list_categories(&client, cli.format).await?;
            }
            BoardCommands::Show { category, id } => {
                board::show_post(&client, &category, id, cli.format).await?;
            }
            BoardCommands::Post {
                title,
                content,
                category,
            } => {
                board::create_post(&client, &title, &content, &category, cli.format).await?;
            }
            BoardCommands::Like { category, id } => {
                board::like_post(&client, &category, id, cli.format).await?;
            }
            BoardCommands::Delete { category, id } => {
                board::delete_post(&client, &category, id).await?;
            }
        },
        Commands::Status => {
            status::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}
