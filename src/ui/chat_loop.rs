//! Line-oriented chat loop.
//!
//! One task owns the [`App`]: it reads stdin lines, applies stream actions as
//! they arrive and redraws whenever the app's revision moves.

use std::error::Error;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{self, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;

use crate::commands::{process_input, CommandResult};
use crate::core::app::{apply_action, apply_actions, App, AppAction, AppActionDispatcher, AppCommand};
use crate::core::chat_stream::{ChatStreamService, CompletionBackend};
use crate::ui::capabilities::{ImageReader, SpeechError, SpeechInputSource};
use crate::ui::renderer::TranscriptRenderer;
use crate::ui::state::{ChatState, PendingImage};

/// Host capabilities injected into the loop.
pub struct Capabilities {
    pub images: Arc<dyn ImageReader>,
    pub speech: Option<Arc<dyn SpeechInputSource>>,
}

pub async fn run_chat(
    app: App,
    backend: Arc<dyn CompletionBackend>,
    capabilities: Capabilities,
    export_dir: PathBuf,
) -> Result<(), Box<dyn Error>> {
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<AppAction>();
    let (speech_tx, mut speech_rx) = mpsc::unbounded_channel::<Result<String, SpeechError>>();
    let dispatcher = AppActionDispatcher::new(action_tx);
    let service = ChatStreamService::new(backend, dispatcher);

    let mut revisions = app.subscribe();
    let mut state = ChatState::new(app, export_dir);
    state.speech_available = capabilities.speech.is_some();
    let mut renderer = TranscriptRenderer::new(std::io::stdout().is_terminal());
    let mut stdout = io::stdout();
    let mut lines = BufReader::new(io::stdin()).lines();

    state.notice("OmniChat. Type /help for commands, /new to start a chat.");
    if state.app.sessions().is_empty() {
        state.app.create_session()?;
    } else {
        state.notice(format!(
            "{} saved chats. /chats lists them, /open <n> resumes one.",
            state.app.sessions().len()
        ));
    }
    flush_output(&mut stdout, &mut state, &mut renderer, true).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match process_input(&mut state, &line) {
                    CommandResult::Continue => {}
                    CommandResult::ProcessAsMessage(line) => {
                        let prompt = state.take_draft_with(&line);
                        submit_prompt(&mut state, &service, prompt);
                    }
                    CommandResult::AttachImage(path) => {
                        attach_image(&mut state, capabilities.images.as_ref(), path).await;
                    }
                    CommandResult::Listen => {
                        start_listening(&mut state, capabilities.speech.clone(), &speech_tx);
                    }
                    CommandResult::Exit => break,
                }
            }
            Some(heard) = speech_rx.recv() => {
                receive_transcript(&mut state, heard);
            }
            Some(action) = action_rx.recv() => {
                let mut actions = vec![action];
                while let Ok(next) = action_rx.try_recv() {
                    actions.push(next);
                }
                for command in apply_actions(&mut state.app, actions) {
                    execute_command(&service, command);
                }
            }
        }

        let redraw = revisions.has_changed().unwrap_or(false);
        if redraw {
            let _ = revisions.borrow_and_update();
        }
        flush_output(&mut stdout, &mut state, &mut renderer, redraw).await?;
    }

    service.shutdown();
    Ok(())
}

fn execute_command(service: &ChatStreamService, command: AppCommand) {
    match command {
        AppCommand::SpawnStream(params) => {
            debug!(session = %params.session_id, stream_id = params.stream_id, "spawning stream");
            service.spawn_stream(params);
        }
    }
}

fn submit_prompt(state: &mut ChatState, service: &ChatStreamService, prompt: String) {
    if prompt.trim().is_empty() {
        return;
    }
    let session_id = match state.app.active_session_id() {
        Some(id) => id.to_string(),
        None => match state.app.create_session() {
            Ok(id) => id,
            Err(e) => {
                state.notice(format!("Could not create chat: {e}"));
                return;
            }
        },
    };
    if state.app.is_streaming(&session_id) {
        state.notice("Still answering in this chat. Wait for the reply to finish.");
        return;
    }

    let pending = state.attachment.take();
    let action = AppAction::SubmitMessage {
        session_id,
        prompt,
        image: pending.as_ref().map(|pending| pending.image.clone()),
    };
    match apply_action(&mut state.app, action) {
        Some(command) => execute_command(service, command),
        None => {
            state.attachment = pending;
            state.notice("Could not save the message, so it was not sent.");
        }
    }
}

/// Runs the speech source on its own task so stream actions keep flowing
/// while the microphone is open.
fn start_listening(
    state: &mut ChatState,
    speech: Option<Arc<dyn SpeechInputSource>>,
    tx: &UnboundedSender<Result<String, SpeechError>>,
) {
    let Some(speech) = speech else {
        return;
    };
    if state.listening {
        state.notice("Already listening.");
        return;
    }
    state.listening = true;
    state.notice("Listening...");
    let tx = tx.clone();
    tokio::spawn(async move {
        let _ = tx.send(speech.listen().await);
    });
}

/// Dictated text is added to the draft rather than sent.
fn receive_transcript(state: &mut ChatState, heard: Result<String, SpeechError>) {
    state.listening = false;
    match heard {
        Ok(text) if text.trim().is_empty() => state.notice("Heard nothing."),
        Ok(text) => {
            state.append_draft(text.trim());
            let notice = format!(
                "Dictated: {}. Press Enter to send it, or type more to add to it.",
                state.draft()
            );
            state.notice(notice);
        }
        Err(e) => state.notice(e.to_string()),
    }
}

async fn attach_image(state: &mut ChatState, reader: &dyn ImageReader, path: PathBuf) {
    match reader.read_image(&path).await {
        Ok(image) => {
            let vision = state
                .app
                .active_session()
                .map(|session| state.app.catalog().resolve(&session.model_id).vision)
                .unwrap_or(true);
            if vision {
                state.notice(format!("Attached {}.", path.display()));
            } else {
                state.notice(format!(
                    "Attached {}, but the current model cannot see images; it will be dropped.",
                    path.display()
                ));
            }
            state.attachment = Some(PendingImage { path, image });
        }
        Err(e) => state.notice(e.to_string()),
    }
}

async fn flush_output<W>(
    out: &mut W,
    state: &mut ChatState,
    renderer: &mut TranscriptRenderer,
    redraw: bool,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut text = String::new();
    for notice in state.take_notices() {
        text.push_str(&notice);
        text.push('\n');
    }
    if redraw {
        text.push_str(&renderer.render(&state.app));
    }
    if !text.is_empty() {
        out.write_all(text.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::StreamMessage;
    use crate::core::message::ImageAttachment;
    use crate::ui::capabilities::ImageError;
    use crate::core::storage::MemoryStore;
    use crate::utils::test_utils::{create_test_app, FailingStore, ScriptedBackend};
    use async_trait::async_trait;
    use std::path::Path;

    struct FixedImage;

    #[async_trait]
    impl ImageReader for FixedImage {
        async fn read_image(&self, _path: &Path) -> Result<ImageAttachment, ImageError> {
            Ok(ImageAttachment {
                base64: "AAAA".into(),
                mime_type: "image/png".into(),
            })
        }
    }

    struct DeniedMicrophone;

    #[async_trait]
    impl SpeechInputSource for DeniedMicrophone {
        async fn listen(&self) -> Result<String, SpeechError> {
            Err(SpeechError::PermissionDenied)
        }
    }

    fn service_with(backend: Arc<ScriptedBackend>) -> (ChatStreamService, mpsc::UnboundedReceiver<AppAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChatStreamService::new(backend, AppActionDispatcher::new(tx)),
            rx,
        )
    }

    #[tokio::test]
    async fn submit_creates_a_chat_when_none_is_active() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedBackend::chunks(&["Hi"])]));
        let (service, mut rx) = service_with(backend.clone());
        let mut state = ChatState::new(create_test_app(), PathBuf::from("."));

        submit_prompt(&mut state, &service, "Hello".to_string());
        let id = state.app.active_session_id().map(str::to_owned).expect("active");

        while let Some(action) = rx.recv().await {
            let done = matches!(action, AppAction::StreamCompleted { .. });
            apply_action(&mut state.app, action);
            if done {
                break;
            }
        }
        let session = state.app.session(&id).expect("session");
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].content, "Hi");
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn submit_while_streaming_is_refused_with_notice() {
        let backend = Arc::new(ScriptedBackend::new(vec![vec![StreamMessage::Chunk("Hi".into())]]));
        let (service, _rx) = service_with(backend);
        let mut state = ChatState::new(create_test_app(), PathBuf::from("."));
        let id = state.app.create_session().expect("create");
        state.app.begin_send(&id, "First", None).expect("send");

        submit_prompt(&mut state, &service, "Second".to_string());
        assert_eq!(state.app.session(&id).expect("session").messages.len(), 1);
        assert!(state.take_notices()[0].starts_with("Still answering"));
    }

    #[tokio::test]
    async fn attached_image_rides_along_with_next_prompt() {
        let backend = Arc::new(ScriptedBackend::new(vec![Vec::new()]));
        let (service, _rx) = service_with(backend.clone());
        let mut state = ChatState::new(create_test_app(), PathBuf::from("."));
        state.app.create_session().expect("create");

        attach_image(&mut state, &FixedImage, PathBuf::from("cat.png")).await;
        assert!(state.attachment.is_some());
        assert_eq!(state.take_notices(), vec!["Attached cat.png.".to_string()]);

        submit_prompt(&mut state, &service, "What is this?".to_string());
        assert!(state.attachment.is_none());
        let user = &state.app.active_session().expect("active").messages[0];
        assert_eq!(user.image.as_ref().map(|i| i.mime_type.as_str()), Some("image/png"));
    }

    #[tokio::test]
    async fn attach_warns_when_model_lacks_vision() {
        let mut state = ChatState::new(create_test_app(), PathBuf::from("."));
        let id = state.app.create_session().expect("create");
        state
            .app
            .set_session_model(&id, "gemini-2.5-flash-preview-tts")
            .expect("set model");

        attach_image(&mut state, &FixedImage, PathBuf::from("cat.png")).await;
        assert!(state.take_notices()[0].contains("cannot see images"));
    }

    struct FixedPhrase;

    #[async_trait]
    impl SpeechInputSource for FixedPhrase {
        async fn listen(&self) -> Result<String, SpeechError> {
            Ok(" what is the weather ".to_string())
        }
    }

    async fn listen_once(state: &mut ChatState, source: Arc<dyn SpeechInputSource>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        start_listening(state, Some(source), &tx);
        assert!(state.listening);
        let heard = rx.recv().await.expect("transcript");
        receive_transcript(state, heard);
    }

    #[tokio::test]
    async fn speech_errors_become_notices() {
        let mut state = ChatState::new(create_test_app(), PathBuf::from("."));
        listen_once(&mut state, Arc::new(DeniedMicrophone)).await;

        assert!(!state.listening);
        assert_eq!(
            state.take_notices(),
            vec![
                "Listening...".to_string(),
                "Microphone access was denied".to_string()
            ]
        );
        assert_eq!(state.draft(), "");
    }

    #[tokio::test]
    async fn dictation_fills_the_draft_instead_of_sending() {
        let backend = Arc::new(ScriptedBackend::new(vec![Vec::new()]));
        let (service, _rx) = service_with(backend.clone());
        let mut state = ChatState::new(create_test_app(), PathBuf::from("."));
        state.app.create_session().expect("create");

        listen_once(&mut state, Arc::new(FixedPhrase)).await;
        assert_eq!(state.draft(), "what is the weather");
        assert!(backend.requests().is_empty());

        let prompt = state.take_draft_with("in Oslo?");
        submit_prompt(&mut state, &service, prompt);
        let user = &state.app.active_session().expect("active").messages[0];
        assert_eq!(user.content, "what is the weather in Oslo?");
    }

    #[tokio::test]
    async fn second_listen_while_listening_is_refused() {
        let mut state = ChatState::new(create_test_app(), PathBuf::from("."));
        state.listening = true;
        let (tx, _rx) = mpsc::unbounded_channel();
        let source: Arc<dyn SpeechInputSource> = Arc::new(FixedPhrase);
        start_listening(&mut state, Some(source), &tx);
        assert_eq!(state.take_notices(), vec!["Already listening.".to_string()]);
    }

    #[tokio::test]
    async fn unsaved_message_keeps_the_attachment() {
        let backend = Arc::new(ScriptedBackend::new(Vec::new()));
        let (service, _rx) = service_with(backend);
        let app = App::new(
            Box::new(FailingStore::new(1)),
            Box::new(MemoryStore::new()),
            "gemini-flash-latest",
        );
        let mut state = ChatState::new(app, PathBuf::from("."));
        state.app.create_session().expect("create");
        attach_image(&mut state, &FixedImage, PathBuf::from("cat.png")).await;
        state.take_notices();

        submit_prompt(&mut state, &service, "What is this?".to_string());
        assert!(state.attachment.is_some());
        assert_eq!(
            state.take_notices(),
            vec!["Could not save the message, so it was not sent.".to_string()]
        );
    }

    #[tokio::test]
    async fn flush_output_writes_notices_before_transcript() {
        let mut state = ChatState::new(create_test_app(), PathBuf::from("."));
        state.app.create_session().expect("create");
        state.notice("Started a new chat.");
        let mut renderer = TranscriptRenderer::new(false);
        let mut out: Vec<u8> = Vec::new();

        flush_output(&mut out, &mut state, &mut renderer, true)
            .await
            .expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.starts_with("Started a new chat.\n── New Chat"));
    }
}
