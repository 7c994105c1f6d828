//! Artifact generation: one analysis/visualization code block per
//! question, concatenated into the request's single artifact file.

use std::fs;
use std::path::PathBuf;

use tracing::info;

use crate::artifact::{expected_outputs, extract_base_name, strip_code_fences};
use crate::dataset::DatasetProfile;
use crate::error::{PipelineError, Result};
use crate::llm::{ChatMessage, ChatService, Role};
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct GeneratedCode {
    pub artifact_path: PathBuf,
    /// Declared chart file names, one per question.
    pub chart_files: Vec<String>,
}

pub struct CodeGenerator<'a> {
    service: &'a dyn ChatService,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(service: &'a dyn ChatService) -> Self {
        Self { service }
    }

    pub async fn generate(
        &self,
        ws: &Workspace,
        profile: &DatasetProfile,
        questions: &[String],
    ) -> Result<GeneratedCode> {
        if questions.is_empty() {
            return Err(PipelineError::Generation("no questions provided".into()));
        }

        let mut combined = String::new();
        let mut chart_files = Vec::with_capacity(questions.len());

        for (i, question) in questions.iter().enumerate() {
            let (code, chart_file) = self.generate_for_question(ws, profile, question).await?;
            combined.push_str(&format!(
                "# Question {}: {}\n# Output: {}\n{}\n\n",
                i + 1,
                question,
                chart_file,
                code
            ));
            chart_files.push(chart_file);
        }

        // Declared base names must be unique across the whole request.
        expected_outputs(&combined)?;

        let artifact_path = ws.artifact_path();
        fs::write(&artifact_path, &combined)
            .map_err(|e| PipelineError::storage_io("write artifact", e))?;
        info!(workspace = %ws.id(), questions = questions.len(), "generated analysis artifact");

        Ok(GeneratedCode { artifact_path, chart_files })
    }

    async fn generate_for_question(
        &self,
        ws: &Workspace,
        profile: &DatasetProfile,
        question: &str,
    ) -> Result<(String, String)> {
        let system = format!(
            "Generate data visualization and statistical analysis code using\n\
             pandas, numpy, matplotlib (Agg backend) and seaborn.\n\n\
             GRAPHS_DIR = r\"{graphs}\"\n\
             STATS_DIR = r\"{stats}\"\n\n\
             Rules:\n\
             1. Read the dataset with pd.read_csv(os.environ['DATA_FILE_PATH']) and\n\
                raise ValueError on an empty dataframe.\n\
             2. You MUST define a base_name variable with a descriptive\n\
                <metric>_<analysis_type> name, then save exactly one chart as\n\
                os.path.join(GRAPHS_DIR, base_name + '.png') and one statistics file as\n\
                os.path.join(STATS_DIR, base_name + '_stats.json').\n\
             3. Keep statistics to mean, median and mode for the involved columns,\n\
                plus additional metrics only when relevant; round numbers to 4\n\
                decimal places.\n\
             4. Include the analysis question under the \"question\" key of the\n\
                statistics JSON and write it with json.dump.\n\
             5. Use the provided column data types to pick the analysis.\n\
             6. Close figures and release memory when done.\n\
             Return ONLY code, no ``` markers.",
            graphs = ws.graphs_dir().display(),
            stats = ws.stats_dir().display(),
        );
        let human = format!(
            "Create visualization code for:\nColumns: {}\nData sample:\n{}\nColumn types:\n{}\nTask: {}\nData path: {}",
            profile.columns.join(", "),
            profile.head_sample(),
            profile.dtype_map(),
            question,
            profile.path.display(),
        );

        let response = self
            .service
            .complete(vec![
                ChatMessage::new(Role::System, system),
                ChatMessage::new(Role::User, human),
            ])
            .await
            .map_err(|e| PipelineError::Generation(format!("generation service: {e}")))?;

        let code = strip_code_fences(&response);
        let base_name = extract_base_name(&code).ok_or_else(|| {
            PipelineError::Generation("could not find base_name in generated code".into())
        })?;

        Ok((code, format!("{}.png", base_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnType;
    use async_trait::async_trait;

    struct Canned(String);

    #[async_trait]
    impl ChatService for Canned {
        async fn complete(&self, _messages: Vec<ChatMessage>) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    fn profile() -> DatasetProfile {
        DatasetProfile {
            path: PathBuf::from("/tmp/data.csv"),
            columns: vec!["age".into(), "score".into()],
            dtypes: vec![ColumnType::Int, ColumnType::Float],
            head: vec![vec!["34".into(), "72.5".into()]],
            row_count: 1,
        }
    }

    #[tokio::test]
    async fn writes_annotated_artifact_per_question() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path()).unwrap();
        let service = Canned("base_name = \"score_analysis\"\nprint('hi')".into());

        let out = CodeGenerator::new(&service)
            .generate(&ws, &profile(), &["average score".to_string()])
            .await
            .unwrap();
        assert_eq!(out.chart_files, vec!["score_analysis.png"]);

        let artifact = fs::read_to_string(out.artifact_path).unwrap();
        assert!(artifact.contains("# Question 1: average score"));
        assert!(artifact.contains("# Output: score_analysis.png"));
        assert!(artifact.contains("print('hi')"));
    }

    #[tokio::test]
    async fn missing_base_name_is_a_generation_error() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path()).unwrap();
        let service = Canned("print('no base name here')".into());

        let err = CodeGenerator::new(&service)
            .generate(&ws, &profile(), &["q".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
    }

    #[tokio::test]
    async fn empty_question_list_is_rejected() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path()).unwrap();
        let service = Canned(String::new());

        let err =
            CodeGenerator::new(&service).generate(&ws, &profile(), &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
    }

    #[tokio::test]
    async fn duplicate_base_names_across_questions_are_rejected() {
        let base = tempfile::tempdir().unwrap();
        let ws = Workspace::create(base.path()).unwrap();
        let service = Canned("base_name = \"score_analysis\"\n".into());

        let err = CodeGenerator::new(&service)
            .generate(&ws, &profile(), &["q1".to_string(), "q2".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
    }
}
