//! CLI command definitions and parsing
use crate::chat::Persona;
use crate::corpus::{Testament, Translation};
use crate::retrieval::SearchMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "versemap",
    version,
    about = "Semantic search over Bible verses and passages",
    long_about = "versemap ranks every verse or passage of a quantized embedding corpus against a \
                  free-text query, filters by book, and reports the matching positions on the \
                  verse sphere. It can also hand the results to a chat model."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/versemap/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile from the config file to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rank verses or passages against a query
    Search {
        /// Search query text
        query: String,

        /// Granularity to search
        #[arg(short, long, default_value = "verses")]
        mode: SearchMode,

        /// Only these books (names, abbreviations or numbers, comma separated)
        #[arg(short, long, value_delimiter = ',')]
        books: Vec<String>,

        /// Only one testament (ot or nt)
        #[arg(short, long, conflicts_with = "books")]
        testament: Option<Testament>,

        /// Display translation (kjv or bsb)
        #[arg(long)]
        translation: Option<Translation>,

        /// Characters of text shown per result
        #[arg(long, default_value = "200")]
        preview: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Load the search assets and report what they contain
    Inspect {
        /// Show one verse and the passages containing it (e.g. "John 3:16")
        #[arg(short, long)]
        reference: Option<String>,
    },

    /// Ask the configured chat model a question
    Chat {
        /// Question to ask
        question: String,

        /// Answering style (standard, max or genius)
        #[arg(long)]
        persona: Option<Persona>,

        /// Ground the answer in a chapter of this book
        #[arg(long, requires = "chapter")]
        book: Option<String>,

        /// Chapter number used with --book
        #[arg(long, requires = "book")]
        chapter: Option<u32>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
