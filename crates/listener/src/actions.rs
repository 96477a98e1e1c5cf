//! Actions run in response to delivered pushes.
//!
//! Three built-ins: echo the record as JSON, pipe it into an external
//! command as JSON, or pipe it as plain text (title line + body).  A
//! command's stdout may carry replies, which the dispatcher sends back
//! out as note pushes.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pw_client::{Error, PushApi, Result};
use pw_protocol::{ActionReply, PushRecord};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A handler invoked once per delivered push.
///
/// Returned replies are pushed back out by the dispatcher.  Errors are
/// logged; they never stop the other configured actions.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    async fn on_push(&self, push: &PushRecord) -> Result<Vec<ActionReply>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Prints each record to stdout as one line of JSON.
pub struct EchoAction;

#[async_trait]
impl Action for EchoAction {
    fn name(&self) -> &str {
        "echo"
    }

    async fn on_push(&self, push: &PushRecord) -> Result<Vec<ActionReply>> {
        println!("{}", serde_json::to_string(push)?);
        Ok(Vec::new())
    }
}

/// Spawns a command, writes the record as JSON to its stdin, and parses
/// stdout as replies (a single `{"title", "body"}` object or a list).
pub struct ExecAction {
    program: String,
    args: Vec<String>,
}

impl ExecAction {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Action for ExecAction {
    fn name(&self) -> &str {
        &self.program
    }

    async fn on_push(&self, push: &PushRecord) -> Result<Vec<ActionReply>> {
        let payload = serde_json::to_string(push)?;
        let output = run_command(&self.program, &self.args, &payload).await?;
        Ok(parse_replies(&output))
    }
}

/// Spawns a command with a plain-text contract: stdin is the title on
/// line one (newlines flattened to spaces) and the body after it, and
/// stdout is read back with the same shape.  Empty stdout means no reply.
pub struct ExecSimpleAction {
    program: String,
    args: Vec<String>,
}

impl ExecSimpleAction {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Action for ExecSimpleAction {
    fn name(&self) -> &str {
        &self.program
    }

    async fn on_push(&self, push: &PushRecord) -> Result<Vec<ActionReply>> {
        let title = flatten_title(&push.title);
        let payload = format!("{title}\n{}", push.body);
        let output = run_command(&self.program, &self.args, &payload).await?;
        Ok(parse_simple_reply(&output).into_iter().collect())
    }
}

/// Spawn, feed stdin, wait, and return stdout.  Non-zero exits and
/// stderr chatter are logged, not errors; the contract is stdout-only.
async fn run_command(program: &str, args: &[String], stdin_payload: &str) -> Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Action {
            action: program.to_owned(),
            message: format!("failed to spawn: {e}"),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // A command may close stdin before reading it all; that is its
        // prerogative, not a dispatch failure.
        if let Err(e) = stdin.write_all(stdin_payload.as_bytes()).await {
            tracing::debug!(action = program, error = %e, "command closed stdin early");
        }
        // Dropping stdin closes the pipe so the child sees EOF.
    }

    let output = child.wait_with_output().await.map_err(|e| Error::Action {
        action: program.to_owned(),
        message: format!("failed to await exit: {e}"),
    })?;

    if !output.status.success() {
        tracing::warn!(
            action = program,
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr),
            "command exited non-zero"
        );
    } else if !output.stderr.is_empty() {
        tracing::debug!(
            action = program,
            stderr = %String::from_utf8_lossy(&output.stderr),
            "command wrote to stderr"
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse exec stdout: one reply object, a list of them, or nothing.
/// Any other shape is ignored rather than treated as a failure.
fn parse_replies(stdout: &str) -> Vec<ActionReply> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(one) = serde_json::from_str::<ActionReply>(trimmed) {
        return vec![one];
    }
    if let Ok(many) = serde_json::from_str::<Vec<ActionReply>>(trimmed) {
        return many;
    }
    tracing::debug!("command stdout is not a reply payload, ignoring");
    Vec::new()
}

/// Parse exec-simple stdout: line one is the title, the rest is the body.
fn parse_simple_reply(stdout: &str) -> Option<ActionReply> {
    let text = stdout.trim_end();
    if text.trim().is_empty() {
        return None;
    }
    let (title, body) = match text.split_once('\n') {
        Some((title, body)) => (title.to_owned(), body.to_owned()),
        None => (text.to_owned(), String::new()),
    };
    Some(ActionReply { title, body })
}

/// The title travels on a single line; embedded newlines become spaces.
fn flatten_title(title: &str) -> String {
    title.replace('\r', "").replace('\n', " ")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Idens of pushes this process sent.  Shared with the resolver so our
/// own pushes are ignored when they echo back over the stream.
#[derive(Default)]
pub struct SentRegistry {
    idens: Mutex<HashSet<String>>,
}

impl SentRegistry {
    pub fn record(&self, iden: impl Into<String>) {
        self.idens.lock().insert(iden.into());
    }

    pub fn contains(&self, iden: &str) -> bool {
        self.idens.lock().contains(iden)
    }
}

/// Runs the configured actions against each record, in configuration
/// order, and sends any replies back out as note pushes.
///
/// Cloneable so the caller can spawn one dispatch task per record.
#[derive(Clone)]
pub struct ActionDispatcher {
    actions: Arc<Vec<Box<dyn Action>>>,
    api: Arc<dyn PushApi>,
    sent: Arc<SentRegistry>,
}

impl ActionDispatcher {
    pub fn new(actions: Vec<Box<dyn Action>>, api: Arc<dyn PushApi>, sent: Arc<SentRegistry>) -> Self {
        Self {
            actions: Arc::new(actions),
            api,
            sent,
        }
    }

    /// Run every action against the record.  A failing action is logged
    /// and the remaining actions still run.
    pub async fn dispatch(&self, push: &PushRecord) {
        for action in self.actions.iter() {
            match action.on_push(push).await {
                Ok(replies) => {
                    for reply in replies {
                        self.send_reply(action.name(), &reply).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(action = action.name(), error = %e, "action failed");
                }
            }
        }
    }

    async fn send_reply(&self, action: &str, reply: &ActionReply) {
        match self.api.push_note(&reply.title, &reply.body, None).await {
            Ok(sent) => {
                self.sent.record(&sent.iden);
                tracing::info!(action, iden = %sent.iden, title = %reply.title, "sent reply push");
            }
            Err(e) => {
                tracing::warn!(action, error = %e, "failed to send reply push");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_protocol::Device;

    #[test]
    fn parse_replies_accepts_object_list_or_nothing() {
        assert!(parse_replies("").is_empty());
        assert!(parse_replies("  \n").is_empty());
        assert!(parse_replies("not json at all").is_empty());
        // Shapes that are valid JSON but not replies are ignored too.
        assert!(parse_replies(r#"{"status":"ok"}"#).is_empty());

        let one = parse_replies(r#"{"title":"T","body":"B"}"#);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].title, "T");

        let many = parse_replies(r#"[{"title":"1"},{"title":"2","body":"b"}]"#);
        assert_eq!(many.len(), 2);
        assert_eq!(many[0].body, "");
        assert_eq!(many[1].body, "b");
    }

    #[test]
    fn parse_simple_reply_splits_title_and_body() {
        assert!(parse_simple_reply("").is_none());
        assert!(parse_simple_reply("   \n  \n").is_none());

        let title_only = parse_simple_reply("just a title\n").unwrap();
        assert_eq!(title_only.title, "just a title");
        assert_eq!(title_only.body, "");

        let full = parse_simple_reply("subject\nline one\nline two").unwrap();
        assert_eq!(full.title, "subject");
        assert_eq!(full.body, "line one\nline two");
    }

    #[test]
    fn flatten_title_strips_newlines() {
        assert_eq!(flatten_title("two\nlines"), "two lines");
        assert_eq!(flatten_title("crlf\r\nstyle"), "crlf style");
        assert_eq!(flatten_title("plain"), "plain");
    }

    fn sample_push() -> PushRecord {
        PushRecord {
            iden: "p1".into(),
            title: "hello\nworld".into(),
            body: "some body".into(),
            modified: 10.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn exec_action_pipes_json_through_a_command() {
        // `cat` returns the record unchanged; the record's own title
        // field makes the output parse as a single reply.
        let action = ExecAction::new("cat", vec![]);
        let replies = action.on_push(&sample_push()).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].title, "hello\nworld");
    }

    #[tokio::test]
    async fn exec_simple_action_flattens_the_title_line() {
        let action = ExecSimpleAction::new("head", vec!["-n".into(), "1".into()]);
        let replies = action.on_push(&sample_push()).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].title, "hello world");
        assert_eq!(replies[0].body, "");
    }

    #[tokio::test]
    async fn exec_simple_roundtrips_through_an_echoing_command() {
        let push = PushRecord {
            title: "T".into(),
            body: "B".into(),
            ..Default::default()
        };
        let action = ExecSimpleAction::new("cat", vec![]);
        let replies = action.on_push(&push).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].title, "T");
        assert_eq!(replies[0].body, "B");
    }

    #[tokio::test]
    async fn exec_simple_action_with_silent_command_yields_no_reply() {
        let action = ExecSimpleAction::new("true", vec![]);
        let replies = action.on_push(&sample_push()).await.unwrap();
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn missing_command_is_an_action_error() {
        let action = ExecAction::new("definitely-not-a-real-command-xyz", vec![]);
        let err = action.on_push(&sample_push()).await.unwrap_err();
        assert!(matches!(err, Error::Action { .. }));
    }

    // ── dispatcher ──────────────────────────────────────────────────

    struct ReplyingAction;

    #[async_trait]
    impl Action for ReplyingAction {
        fn name(&self) -> &str {
            "replying"
        }

        async fn on_push(&self, _push: &PushRecord) -> Result<Vec<ActionReply>> {
            Ok(vec![ActionReply {
                title: "reply".into(),
                body: "body".into(),
            }])
        }
    }

    struct FailingAction;

    #[async_trait]
    impl Action for FailingAction {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_push(&self, _push: &PushRecord) -> Result<Vec<ActionReply>> {
            Err(Error::Action {
                action: "failing".into(),
                message: "boom".into(),
            })
        }
    }

    /// Records push_note calls and hands back a fixed iden.
    struct RecordingApi {
        notes: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PushApi for RecordingApi {
        async fn verify_key(&self) -> Result<f64> {
            Ok(0.0)
        }

        async fn pushes_modified_after(&self, _modified_after: f64) -> Result<Vec<PushRecord>> {
            Ok(Vec::new())
        }

        async fn push_note(
            &self,
            title: &str,
            body: &str,
            _device_iden: Option<&str>,
        ) -> Result<PushRecord> {
            self.notes.lock().push((title.into(), body.into()));
            Ok(PushRecord {
                iden: "sent-1".into(),
                ..Default::default()
            })
        }

        async fn push_link(
            &self,
            _title: &str,
            _body: &str,
            _url: &str,
            _device_iden: Option<&str>,
        ) -> Result<PushRecord> {
            unimplemented!("not used in dispatcher tests")
        }

        async fn devices(&self) -> Result<Vec<Device>> {
            Ok(Vec::new())
        }

        async fn create_device(&self, _nickname: &str) -> Result<Device> {
            unimplemented!("not used in dispatcher tests")
        }
    }

    #[tokio::test]
    async fn dispatcher_sends_replies_and_records_their_idens() {
        let api = Arc::new(RecordingApi {
            notes: Mutex::new(Vec::new()),
        });
        let sent = Arc::new(SentRegistry::default());
        let dispatcher = ActionDispatcher::new(
            // A failing action first must not stop the replying one.
            vec![Box::new(FailingAction), Box::new(ReplyingAction)],
            api.clone(),
            sent.clone(),
        );

        dispatcher.dispatch(&sample_push()).await;

        let notes = api.notes.lock();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].0, "reply");
        assert!(sent.contains("sent-1"));
    }
}
