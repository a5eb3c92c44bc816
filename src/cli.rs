use clap::{Parser, Subcommand};

/// Operator command surface (SPEC_FULL.md §2.2). Minimal by design: OPML
/// import/export and a richer feed-list file format are external
/// collaborators, not this crate's concern.
#[derive(Parser, Debug)]
#[command(name = "feedriver", about = "A polite, concurrent feed aggregator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one fetchAll cycle against the configured feed set.
    Poll,
    /// Run schema migrations standalone.
    Migrate,
    /// Add a feed by URL.
    AddFeed {
        url: String,
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Remove a feed by id.
    RemoveFeed { id: i64 },
    /// List known feeds.
    ListFeeds {
        #[arg(long)]
        active_only: bool,
    },
    /// Delete entries older than the given number of days.
    Prune {
        #[arg(long)]
        days: i64,
        #[arg(long, default_value = "first_seen")]
        filter_by: String,
    },
}
