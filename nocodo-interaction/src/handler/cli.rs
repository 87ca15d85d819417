use super::{answered, open_question, prepare_question, QuestionHandler};
use crate::collector::{AnswerCollector, InProcessCollector};
use crate::error::{QuestionError, QuestionResult};
use crate::question::Question;
use crate::store::QuestionStore;
use async_trait::async_trait;
use shared_types::{HandlerCapabilities, Platform, QuestionData, QuestionResponse};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Asks on a terminal: prints the prompt with numbered suggestions and reads one line
pub struct CliQuestionHandler<R, W> {
    store: Arc<QuestionStore>,
    collector: InProcessCollector,
    input: Arc<Mutex<R>>,
    output: Arc<Mutex<W>>,
}

impl CliQuestionHandler<BufReader<Stdin>, Stdout> {
    pub fn stdio(store: Arc<QuestionStore>) -> Self {
        Self::new(store, BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> CliQuestionHandler<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(store: Arc<QuestionStore>, input: R, output: W) -> Self {
        Self {
            collector: InProcessCollector::new(store.clone()),
            store,
            input: Arc::new(Mutex::new(input)),
            output: Arc::new(Mutex::new(output)),
        }
    }

    pub fn output(&self) -> Arc<Mutex<W>> {
        self.output.clone()
    }

    async fn write(&self, text: &str) -> std::io::Result<()> {
        let mut output = self.output.lock().await;
        output.write_all(text.as_bytes()).await?;
        output.flush().await
    }

    async fn render(&self, question: &Question) -> std::io::Result<()> {
        let mut text = format!("\n? {}\n", question.prompt);
        for (index, suggestion) in question.suggestions.iter().enumerate() {
            text.push_str(&format!("  {}) {}\n", index + 1, suggestion));
        }
        text.push_str("> ");
        self.write(&text).await
    }

    /// Read one line and settle the question with it. EOF counts as a cancel.
    fn spawn_reader(&self, question: &Question) -> JoinHandle<()> {
        let input = self.input.clone();
        let store = self.store.clone();
        let question_id = question.id.clone();
        let suggestions = question.suggestions.clone();

        tokio::spawn(async move {
            let mut line = String::new();
            let read = {
                let mut input = input.lock().await;
                input.read_line(&mut line).await
            };

            let outcome = match read {
                Ok(0) => store.cancel(&question_id, "terminal input closed"),
                Ok(_) => store.resolve(&question_id, &interpret_answer(&line, &suggestions)),
                Err(e) => store.cancel(&question_id, &format!("terminal read failed: {e}")),
            };

            if let Err(e) = outcome {
                debug!(question_id = %question_id, error = %e, "Terminal reply after question settled");
            }
        })
    }
}

/// A suggestion number picks that suggestion; anything else is the literal answer
pub fn interpret_answer(line: &str, suggestions: &[String]) -> String {
    let reply = line.trim();
    match reply.parse::<usize>() {
        Ok(choice) if (1..=suggestions.len()).contains(&choice) => suggestions[choice - 1].clone(),
        _ => reply.to_string(),
    }
}

#[async_trait]
impl<R, W> QuestionHandler for CliQuestionHandler<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn platform(&self) -> Platform {
        Platform::Cli
    }

    fn capabilities(&self) -> HandlerCapabilities {
        HandlerCapabilities {
            suggestions: true,
            rich_formatting: false,
            cancellation: false,
        }
    }

    async fn ask_question(&self, data: QuestionData) -> QuestionResult<QuestionResponse> {
        self.validate_question(&data)
            .map_err(QuestionError::validation)?;
        let data = prepare_question(data, &self.capabilities());
        let (question, _expiry) = open_question(&self.store, &data, None)?;

        if let Err(e) = self.render(&question).await {
            let _ = self.store.cancel(&question.id, "terminal unavailable");
            return Err(e.into());
        }

        let reader = self.spawn_reader(&question);
        let outcome = self.collector.wait_for_answer(&question.id).await;
        reader.abort();

        match outcome {
            Ok(answer) => Ok(answered(&question.id, answer)),
            Err(e) => {
                if e.is_no_longer_valid() {
                    if let Err(io) = self
                        .write(&format!("\nThis question is no longer valid: {e}\n"))
                        .await
                    {
                        warn!(question_id = %question.id, error = %io, "Failed to notify terminal");
                    }
                }
                Err(e)
            }
        }
    }
}
