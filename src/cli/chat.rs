use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Local;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::ai::chat::{ModelId, Session, SessionError, export};
use crate::ai::persona::{PersonaConfig, PersonaSource};
use crate::core::AppConfig;
use crate::documents::{KnowledgeUpdate, UploadedFile};
use crate::openai::OpenAiClient;

const HELP: &str = "\
Commands:
  /upload <path>...   Add PDF or DOCX documents to the knowledge base
  /remove <filename>  Remove a document (clears the knowledge base)
  /files              List uploaded documents
  /model [id]         Show or change the model
  /models             List available models
  /key <api-key>      Set your OpenAI API key (it is never stored)
  /persona <path>     Load a persona JSON file
  /restart            Start the conversation over
  /export             Save the conversation to a text file
  /help               Show this message
  /quit               Exit
Anything else is sent to the assistant. Start a message with // to send
one that begins with a slash.";

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Turn(&'a str),
    Upload(Vec<&'a str>),
    Remove(&'a str),
    Files,
    Model(Option<&'a str>),
    Models,
    Key(&'a str),
    Persona(&'a str),
    Restart,
    Export,
    Help,
    Quit,
    Unknown(&'a str),
}

impl<'a> Input<'a> {
    /// Turns keep the line exactly as typed. Trimming only decides
    /// whether the line is a command.
    fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Input::Turn("");
        }
        // `//` sends the rest of the line, starting with one slash
        if trimmed.starts_with("//") {
            let indent = line.len() - line.trim_start().len();
            return Input::Turn(&line[indent + 1..]);
        }
        let Some(command) = trimmed.strip_prefix('/') else {
            return Input::Turn(line);
        };
        let (name, rest) = command
            .split_once(char::is_whitespace)
            .unwrap_or((command, ""));
        let rest = rest.trim();

        match name {
            "upload" => Input::Upload(rest.split_whitespace().collect()),
            "remove" => Input::Remove(rest),
            "files" => Input::Files,
            "model" => Input::Model(Some(rest).filter(|r| !r.is_empty())),
            "models" => Input::Models,
            "key" => Input::Key(rest),
            "persona" => Input::Persona(rest),
            "restart" => Input::Restart,
            "export" => Input::Export,
            "help" => Input::Help,
            "quit" | "exit" => Input::Quit,
            other => Input::Unknown(other),
        }
    }
}

pub async fn run(config: AppConfig) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    // A broken persona file shouldn't stop the session from starting
    let source = PersonaSource::from_path(config.persona_path.as_deref());
    let persona = source.load().unwrap_or_else(|e| {
        println!("Error: {}", e);
        println!("Using the built-in persona instead.");
        PersonaConfig::default()
    });

    let mut session = Session::builder(OpenAiClient::new(&config.openai_api_hostname))
        .persona(persona)
        .model(config.openai_model)
        .api_key(config.openai_api_key.as_deref())
        .build();

    print_banner(&session);

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                let input = Input::parse(&line);
                // Keep keys out of the editor history
                if !matches!(input, Input::Key(_)) {
                    let _ = rl.add_history_entry(line.as_str());
                }
                match input {
                    Input::Quit => break,
                    Input::Turn("") => continue,
                    input => {
                        if let Err(err) = handle(&mut session, input, &config).await {
                            report(&err);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

async fn handle(session: &mut Session, input: Input<'_>, config: &AppConfig) -> Result<()> {
    match input {
        Input::Turn(text) => {
            let reply = session.next_msg(text).await?;
            println!("{}\n", reply);
        }
        Input::Upload(paths) => {
            if paths.is_empty() {
                bail!("Usage: /upload <path>...");
            }
            let files = paths
                .iter()
                .map(|p| UploadedFile::from_path(Path::new(p)))
                .collect::<Result<Vec<_>, _>>()?;
            let update = session.upload(files).await?;
            print_update(update);
        }
        Input::Remove(filename) => {
            if filename.is_empty() {
                bail!("Usage: /remove <filename>");
            }
            let update = session.remove_upload(filename).await?;
            print_update(update);
        }
        Input::Files => {
            let uploads = session.uploads();
            if uploads.is_empty() {
                println!("No documents uploaded.");
            }
            for name in uploads.iter() {
                println!("  {}", name);
            }
            if !uploads.is_empty() && session.state().knowledge_base().is_empty() {
                println!("The knowledge base is empty, upload a document to rebuild it.");
            }
        }
        Input::Model(None) => {
            println!("Current model: {}", session.state().selected_model());
        }
        Input::Model(Some(id)) => {
            let model: ModelId = id.parse()?;
            session.select_model(model);
            println!("Switched to {}", model);
        }
        Input::Models => {
            let current = session.state().selected_model();
            for model in ModelId::ALL {
                let marker = if model == current { "*" } else { " " };
                println!("{} {}", marker, model);
            }
        }
        Input::Key(key) => {
            session.set_api_key(key);
            if session.persona().api_key().is_some() {
                println!("The persona config supplies an API key, it will be used instead.");
            } else if session.credential().is_some() {
                println!("API key set.");
            } else {
                println!("API key cleared.");
            }
        }
        Input::Persona(path) => {
            if path.is_empty() {
                bail!("Usage: /persona <path>");
            }
            session.load_persona(&PersonaSource::File(PathBuf::from(path)))?;
            println!(
                "Loaded persona: {}. Use /restart to begin with its greeting.",
                session.persona().title
            );
        }
        Input::Restart => {
            session.restart();
            print_last_message(session);
        }
        Input::Export => {
            let path = write_export(session, &config.export_path)?;
            println!("Exported conversation to {}", path.display());
        }
        Input::Help => println!("{}", HELP),
        Input::Unknown(name) => {
            bail!("Unknown command /{}. Type /help for a list of commands.", name)
        }
        Input::Quit => {}
    }

    Ok(())
}

fn report(err: &anyhow::Error) {
    println!("{}", error_message(err));
}

/// Failed completions get a hint about the API key, nothing else does.
fn error_message(err: &anyhow::Error) -> String {
    let mut msg = format!("Error: {}", err);
    if let Some(SessionError::Completion(_)) = err.downcast_ref::<SessionError>() {
        msg.push_str("\nPlease check your OpenAI API key and try again.");
    }
    msg
}

fn print_update(update: KnowledgeUpdate) {
    match update {
        KnowledgeUpdate::Rebuilt { files, .. } => {
            println!("Processed {} document(s) successfully!", files)
        }
        KnowledgeUpdate::Cleared => {
            println!("Knowledge base cleared. Upload documents again to repopulate it.")
        }
        KnowledgeUpdate::Unchanged => {}
    }
}

fn print_banner(session: &Session) {
    let title = &session.persona().title;
    println!("{}\n{}", title, "=".repeat(title.chars().count()));
    println!(
        "Model: {}. Type /help for commands.",
        session.state().selected_model()
    );
    if session.credential().is_none() {
        println!("No OpenAI API key found, set one with /key. We do not store your key.");
    }
    println!();
    print_last_message(session);
}

fn print_last_message(session: &Session) {
    if let Some(msg) = session.state().transcript().last() {
        println!("{}\n", msg.content);
    }
}

fn write_export(session: &Session, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export::filename(&Local::now()));
    std::fs::write(&path, session.export())?;
    tracing::info!(session_id = %session.session_id, path = %path.display(), "Conversation exported");
    Ok(path)
}
