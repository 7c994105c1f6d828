use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "autoreport", about = "Automated data analysis report generator", version)]
pub struct Cli {
    /// Tabular dataset to analyze (CSV).
    #[arg(value_name = "DATA_FILE")]
    pub data_file: String,

    /// Analysis question. Can be used multiple times:
    /// -q "trend of glucose" -q "age distribution"
    #[arg(short = 'q', long = "question", action = clap::ArgAction::Append, required = true)]
    pub questions: Vec<String>,

    /// Title printed on the report cover and page headers.
    #[arg(short = 't', long, default_value = "Data Analysis Report")]
    pub title: String,

    /// Large language model for code generation and repair.
    #[arg(long)]
    pub model: Option<String>,

    /// Multimodal model for chart annotation.
    #[arg(long = "vision-model")]
    pub vision_model: Option<String>,

    /// Root directory for per-request workspaces.
    #[arg(long = "output-dir")]
    pub output_dir: Option<String>,
}
