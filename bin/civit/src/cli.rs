use std::path::PathBuf;

use civit_catalog::ExportFormat;
use civit_store::DownloadStatus;
use civit_types::{ModelType, Period, SearchParams, SortOrder};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "civit", version)]
#[command(about = "Discover, catalogue and download models from CivitAI")]
pub struct Cli {
    /// Config file (default: <config_dir>/civit/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database URL, e.g. sqlite://civit.db
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// CivitAI API key
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log as newline-delimited JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search models on CivitAI
    Search {
        #[command(flatten)]
        filter: SearchArgs,

        /// Stop after this many models
        #[arg(short = 'n', long, default_value_t = 20)]
        max: usize,

        /// Also store the results in the local database
        #[arg(long)]
        save: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show one model
    Model {
        id: u64,

        /// Store the model in the local database
        #[arg(long)]
        save: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show one model version
    Version {
        id: u64,

        #[arg(long)]
        json: bool,
    },

    /// Find the model version a file hash belongs to
    Hash {
        /// SHA256, AutoV2, BLAKE3 or CRC32 hash
        hash: String,

        #[arg(long)]
        json: bool,
    },

    /// List tags
    Tags {
        query: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },

    /// List creators
    Creators {
        query: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: u32,

        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },

    /// Stream search results into the local database
    Sync {
        #[command(flatten)]
        filter: SearchArgs,

        /// Stop after this many models (default: everything)
        #[arg(short = 'n', long)]
        max: Option<usize>,

        /// Adapt page and cache sizes to system memory pressure
        #[arg(long)]
        adaptive: bool,
    },

    /// Download model files
    Download {
        /// Model ids to download
        ids: Vec<u64>,

        /// Download every stored model matching the filters instead
        #[arg(long, conflicts_with = "ids")]
        from_store: bool,

        #[command(flatten)]
        filter: StoreFilter,

        /// Specific version (only with a single model id)
        #[arg(long)]
        version_id: Option<u64>,

        /// Every file of the version, not only the primary one
        #[arg(long)]
        all_files: bool,

        /// Only files in this format, e.g. SafeTensor
        #[arg(long)]
        format: Option<String>,

        /// Target directory (default: configured download_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Parallel downloads (default: configured concurrency)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
    },

    /// Show download history
    History {
        #[arg(long, value_parser = parse_status)]
        status: Option<DownloadStatus>,

        #[arg(short, long, default_value_t = 50)]
        limit: u32,
    },

    /// Catalogue statistics
    Stats {
        #[arg(long, default_value_t = 10)]
        top: usize,

        #[arg(long)]
        json: bool,
    },

    /// Find duplicate models in the local database
    Duplicates {
        #[arg(long, value_enum, default_value_t = DuplicateMode::Both)]
        by: DuplicateMode,

        #[arg(long)]
        json: bool,
    },

    /// Recompute categories for every stored model
    Classify,

    /// Usage hints (trigger words, weight, CFG, ...) from a model description
    Hints {
        id: u64,

        #[arg(long)]
        json: bool,
    },

    /// Export stored models
    Export {
        output: PathBuf,

        /// csv, json, yaml, md or html (default: from the file extension)
        #[arg(short, long)]
        format: Option<ExportFormat>,

        #[command(flatten)]
        filter: StoreFilter,
    },

    /// Import models from a JSON, YAML or CSV file
    Import { input: PathBuf },
}

/// Remote search filters shared by `search` and `sync`.
#[derive(Debug, Clone, Default, Args)]
pub struct SearchArgs {
    /// Free-text query
    pub query: Option<String>,

    /// Model type (repeatable): checkpoint, lora, locon, ...
    #[arg(short = 't', long = "type", value_parser = parse_model_type)]
    pub types: Vec<ModelType>,

    #[arg(long)]
    pub tag: Option<String>,

    /// Creator username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Base model (repeatable), e.g. "SDXL 1.0"
    #[arg(long = "base-model")]
    pub base_models: Vec<String>,

    /// Highest Rated, Most Downloaded, Newest, ...
    #[arg(long)]
    pub sort: Option<SortOrder>,

    /// AllTime, Year, Month, Week, Day
    #[arg(long)]
    pub period: Option<Period>,

    #[arg(long)]
    pub nsfw: Option<bool>,

    /// Page size
    #[arg(long, default_value_t = 100)]
    pub limit: u32,
}

impl SearchArgs {
    pub fn to_params(&self) -> SearchParams {
        let mut params = SearchParams::new().limit(self.limit);
        if let Some(q) = self.query.as_deref().filter(|q| !q.trim().is_empty()) {
            params = params.query(q);
        }
        for t in &self.types {
            params = params.model_type(*t);
        }
        if let Some(tag) = &self.tag {
            params = params.tag(tag.as_str());
        }
        if let Some(user) = &self.username {
            params = params.username(user.as_str());
        }
        for base in &self.base_models {
            params = params.base_model(base.as_str());
        }
        if let Some(sort) = self.sort {
            params = params.sort(sort);
        }
        if let Some(period) = self.period {
            params = params.period(period);
        }
        if let Some(nsfw) = self.nsfw {
            params = params.nsfw(nsfw);
        }
        params
    }
}

/// Filters over the local database.
#[derive(Debug, Clone, Default, Args)]
pub struct StoreFilter {
    #[arg(long = "type", value_parser = parse_model_type)]
    pub model_type: Option<ModelType>,

    #[arg(long)]
    pub base_model: Option<String>,

    #[arg(long)]
    pub creator: Option<String>,

    #[arg(long)]
    pub nsfw: Option<bool>,

    #[arg(long)]
    pub limit: Option<u32>,
}

impl StoreFilter {
    pub fn to_filter(&self) -> civit_store::ModelFilter {
        civit_store::ModelFilter {
            model_type: self.model_type.map(|t| t.as_str().to_owned()),
            base_model: self.base_model.clone(),
            creator: self.creator.clone(),
            nsfw: self.nsfw,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DuplicateMode {
    Hash,
    Name,
    Both,
}

fn parse_model_type(raw: &str) -> Result<ModelType, String> {
    ModelType::parse_loose(raw).map_err(|e| e.to_string())
}

fn parse_status(raw: &str) -> Result<DownloadStatus, String> {
    raw.parse::<DownloadStatus>().map_err(|_| {
        format!("unknown status '{raw}' (pending, downloading, completed, failed, skipped)")
    })
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn search_filters_render_to_params() {
        let cli = Cli::try_parse_from([
            "civit", "search", "pony", "-t", "lycoris", "-t", "checkpoint", "--sort", "most-downloaded",
            "--base-model", "SDXL 1.0", "--limit", "50",
        ])
        .unwrap();
        let Command::Search { filter, max, .. } = cli.command else {
            panic!("expected search");
        };
        assert_eq!(max, 20);
        let params = filter.to_params();
        assert_eq!(params.query.as_deref(), Some("pony"));
        assert_eq!(params.types, vec![ModelType::LoCon, ModelType::Checkpoint]);
        assert_eq!(params.sort, Some(SortOrder::MostDownloaded));
        assert_eq!(params.base_models, vec!["SDXL 1.0".to_owned()]);
        assert_eq!(params.limit, Some(50));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["civit", "stats", "-vv", "--database", "sqlite::memory:"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.database.as_deref(), Some("sqlite::memory:"));
    }

    #[test]
    fn download_ids_conflict_with_store_selection() {
        assert!(Cli::try_parse_from(["civit", "download", "1", "--from-store"]).is_err());
        let cli = Cli::try_parse_from(["civit", "download", "--from-store", "--type", "lora"]).unwrap();
        let Command::Download { filter, from_store, .. } = cli.command else {
            panic!("expected download");
        };
        assert!(from_store);
        assert_eq!(filter.to_filter().model_type.as_deref(), Some("LORA"));
    }

    #[test]
    fn export_format_and_status_parse() {
        let cli = Cli::try_parse_from(["civit", "export", "out.txt", "--format", "yaml"]).unwrap();
        assert!(matches!(cli.command, Command::Export { format: Some(ExportFormat::Yaml), .. }));

        let cli = Cli::try_parse_from(["civit", "history", "--status", "failed"]).unwrap();
        assert!(matches!(cli.command, Command::History { status: Some(DownloadStatus::Failed), .. }));
        assert!(Cli::try_parse_from(["civit", "history", "--status", "lost"]).is_err());
    }
}
