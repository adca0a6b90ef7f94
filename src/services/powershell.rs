//! Windows backend: every query is a short PowerShell script run as a child
//! process. Scripts travel base64-encoded on the command line and read their
//! arguments as JSON from stdin, so paths and identifiers are never spliced
//! into script text.

use crate::services::directory::{
    AccountAttributes, BatchError, DirectoryBatch, DirectoryObject, DirectoryService,
    DirectorySnapshot, LookupError, SnapshotEntry,
};
use crate::services::owner::{OwnerQuery, OwnerQueryError};
use crate::services::sanitize::{clean_bool, clean_value};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const REAP_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_GRACE: Duration = Duration::from_millis(500);
const EXIT_ACCESS_DENIED: i32 = 5;

const PRELUDE: &str = r#"
$OutputEncoding = [System.Text.Encoding]::UTF8
[Console]::OutputEncoding = [System.Text.Encoding]::UTF8
$ProgressPreference = 'SilentlyContinue'
$req = [Console]::In.ReadToEnd() | ConvertFrom-Json
"#;

const OWNER_SCRIPT: &str = r#"
$ErrorActionPreference = 'Stop'
if (-not (Test-Path -LiteralPath $req.path)) {
    @{ exists = $false } | ConvertTo-Json -Compress
    exit 0
}
try {
    $acl = Get-Acl -LiteralPath $req.path
    @{ exists = $true; owner = [string]$acl.Owner } | ConvertTo-Json -Compress
} catch [System.UnauthorizedAccessException] {
    [Console]::Error.WriteLine($_.Exception.Message)
    exit 5
}
"#;

const TRANSLATE_SCRIPT: &str = r#"
try {
    $sid = ([System.Security.Principal.NTAccount]$req.principal).Translate(
        [System.Security.Principal.SecurityIdentifier]).Value
    @{ sid = $sid } | ConvertTo-Json -Compress
} catch {
    @{ error = $_.Exception.Message } | ConvertTo-Json -Compress
}
"#;

const DIRECTORY_SCRIPT: &str = r#"
$ErrorActionPreference = 'Continue'
Import-Module ActiveDirectory -ErrorAction Stop
function Get-LookupFailure($err) {
    $kind = switch -Wildcard ($err.Exception.GetType().FullName) {
        '*ADIdentityNotFoundException' { 'not_found' }
        '*UnauthorizedAccessException' { 'access_denied' }
        '*ADIdentityResolutionException' { 'unrecognized' }
        default { 'other' }
    }
    @{ kind = $kind; message = $err.Exception.Message }
}
function Get-AccountView($u) {
    @{ name = $u.Name; sAMAccountName = $u.SamAccountName; mail = $u.mail;
       enabled = $u.Enabled; distinguishedName = $u.DistinguishedName }
}
$results = foreach ($sid in @($req.sids)) {
    $entry = @{ sid = $sid }
    try {
        $obj = Get-ADObject -Filter "objectSid -eq '$sid'" -IncludeDeletedObjects `
            -Properties name, sAMAccountName, mail, objectClass, isDeleted -ErrorAction Stop |
            Select-Object -First 1
        if ($obj) {
            $entry.object = @{ name = $obj.Name; sAMAccountName = $obj.sAMAccountName; mail = $obj.mail;
                objectClass = @($obj.ObjectClass); distinguishedName = $obj.DistinguishedName;
                deleted = [bool]$obj.isDeleted }
            if (@($obj.ObjectClass) -contains 'user') {
                try {
                    $u = Get-ADUser -Identity $sid -Properties mail -ErrorAction Stop
                    $entry.account = Get-AccountView $u
                } catch {
                    $entry.accountError = Get-LookupFailure $_
                }
            }
        } else {
            $entry.directError = @{ kind = 'not_found'; message = "no object with objectSid $sid" }
        }
    } catch {
        $entry.directError = Get-LookupFailure $_
    }
    if ($entry.directError) {
        try {
            $h = Get-ADUser -Filter "SIDHistory -eq '$sid'" -Properties mail, SIDHistory -ErrorAction Stop |
                Select-Object -First 1
            if ($h) { $entry.history = Get-AccountView $h }
        } catch {
            $entry.historyError = $_.Exception.Message
        }
    }
    $entry
}
ConvertTo-Json -InputObject @($results) -Depth 5 -Compress
"#;

#[derive(thiserror::Error, Debug)]
pub enum ScriptError {
    #[error("cannot start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o with script process failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("script timed out after {0:?}")]
    Timeout(Duration),
    #[error("script exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("unexpected script output: {0}")]
    Decode(String),
}

/// PowerShell takes `-EncodedCommand` as base64 over UTF-16LE.
pub fn encode_script(script: &str) -> String {
    let bytes: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    STANDARD.encode(bytes)
}

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    program: String,
}

impl ScriptRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Runs `body` with `input` on stdin and returns trimmed stdout. The child
    /// is killed once `timeout` elapses.
    pub fn run(&self, body: &str, input: &Value, timeout: Duration) -> Result<String, ScriptError> {
        let script = format!("{PRELUDE}{body}");
        let payload = serde_json::to_vec(input).map_err(|e| ScriptError::Decode(e.to_string()))?;
        let mut child = Command::new(&self.program)
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-EncodedCommand",
                &encode_script(&script),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ScriptError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                let _ = stdin.write_all(&payload);
            })
        });
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = wait_with_deadline(&mut child, timeout)?;
        // Descendants may inherit the pipes and keep them open after the child
        // is gone; their readers are abandoned rather than waited on.
        let drain_deadline = Instant::now() + DRAIN_GRACE;
        if let Some(handle) = writer {
            let _ = join_until(handle, drain_deadline);
        }
        let stdout = collect(stdout, drain_deadline);
        let stderr = collect(stderr, drain_deadline);

        match status {
            None => Err(ScriptError::Timeout(timeout)),
            Some(status) if status.success() => Ok(stdout
                .trim_start_matches('\u{feff}')
                .trim()
                .to_string()),
            Some(status) => Err(ScriptError::Failed {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            }),
        }
    }
}

fn drain<R: Read + Send + 'static>(mut source: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = source.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>, deadline: Instant) -> String {
    handle
        .and_then(|h| join_until(h, deadline))
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

/// Joins `handle` if it finishes before `deadline`; otherwise detaches it.
fn join_until<T>(handle: JoinHandle<T>, deadline: Instant) -> Option<T> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!("script pipe still open after exit; abandoning reader");
            return None;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    handle.join().ok()
}

/// `None` when the deadline passed; the child has been killed and reaped by then.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>, ScriptError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let reap_deadline = Instant::now() + REAP_TIMEOUT;
            while Instant::now() < reap_deadline {
                if let Ok(Some(_)) = child.try_wait() {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[derive(Debug, Deserialize)]
struct OwnerAnswer {
    exists: bool,
    #[serde(default)]
    owner: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslateAnswer {
    #[serde(default)]
    sid: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFailure {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    message: Value,
}

impl RawFailure {
    fn into_error(self) -> LookupError {
        match self.kind.as_str() {
            "not_found" => LookupError::NotFound,
            "access_denied" => LookupError::AccessDenied,
            "unrecognized" => LookupError::Unrecognized,
            _ => LookupError::Failed(clean_value(&self.message)),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawAttributes {
    #[serde(default)]
    name: Value,
    #[serde(rename = "sAMAccountName", default)]
    sam_account_name: Value,
    #[serde(default)]
    mail: Value,
    #[serde(default)]
    enabled: Value,
    #[serde(rename = "objectClass", default)]
    object_class: Value,
    #[serde(rename = "distinguishedName", default)]
    distinguished_name: Value,
    #[serde(default)]
    deleted: Value,
}

impl RawAttributes {
    fn object(&self) -> DirectoryObject {
        let object_class = match &self.object_class {
            Value::Array(items) => items.iter().map(clean_value).collect(),
            Value::Null => Vec::new(),
            other => vec![clean_value(other)],
        };
        DirectoryObject {
            display_name: clean_value(&self.name),
            account_name: clean_value(&self.sam_account_name),
            email: clean_value(&self.mail),
            object_class,
            distinguished_name: clean_value(&self.distinguished_name),
            deleted: clean_bool(&self.deleted),
        }
    }

    fn account(&self) -> AccountAttributes {
        AccountAttributes {
            display_name: clean_value(&self.name),
            account_name: clean_value(&self.sam_account_name),
            email: clean_value(&self.mail),
            enabled: clean_bool(&self.enabled),
            distinguished_name: clean_value(&self.distinguished_name),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    sid: String,
    #[serde(default)]
    object: Option<RawAttributes>,
    #[serde(default)]
    account: Option<RawAttributes>,
    #[serde(default)]
    account_error: Option<RawFailure>,
    #[serde(default)]
    direct_error: Option<RawFailure>,
    #[serde(default)]
    history: Option<RawAttributes>,
    #[serde(default)]
    history_error: Option<Value>,
}

impl RawEntry {
    fn into_snapshot_entry(self) -> SnapshotEntry {
        let object = match (self.object, self.direct_error) {
            (Some(obj), _) => Ok(obj.object()),
            (None, Some(err)) => Err(err.into_error()),
            (None, None) => Err(LookupError::NotFound),
        };
        let account = match (self.account, self.account_error) {
            (Some(acc), _) => Ok(acc.account()),
            (None, Some(err)) => Err(err.into_error()),
            (None, None) => Err(LookupError::NotFound),
        };
        let history = match (self.history, self.history_error) {
            (Some(acc), _) => Ok(Some(acc.account())),
            (None, Some(msg)) => Err(LookupError::Failed(clean_value(&msg))),
            (None, None) => Ok(None),
        };
        SnapshotEntry {
            object,
            account,
            history,
        }
    }
}

/// Parses the directory script's output into a per-identifier view.
/// A single-element result may arrive as a bare object.
pub fn parse_directory_response(raw: &str) -> Result<DirectorySnapshot, ScriptError> {
    if raw.is_empty() {
        return Ok(DirectorySnapshot::default());
    }
    let value: Value = serde_json::from_str(raw).map_err(|e| ScriptError::Decode(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    let mut snapshot = DirectorySnapshot::default();
    for item in items {
        let entry: RawEntry =
            serde_json::from_value(item).map_err(|e| ScriptError::Decode(e.to_string()))?;
        let sid = entry.sid.trim().to_string();
        snapshot.insert(sid, entry.into_snapshot_entry());
    }
    if snapshot.is_empty() {
        tracing::warn!("directory script answered for no identifiers");
    }
    Ok(snapshot)
}

pub struct PowerShellBackend {
    runner: ScriptRunner,
    owner_timeout: Duration,
}

impl PowerShellBackend {
    pub fn new(program: impl Into<String>, owner_timeout: Duration) -> Self {
        Self {
            runner: ScriptRunner::new(program),
            owner_timeout,
        }
    }

    fn owner_error(&self, err: ScriptError) -> OwnerQueryError {
        match err {
            ScriptError::Timeout(t) => OwnerQueryError::Timeout(t),
            ScriptError::Failed {
                code: Some(EXIT_ACCESS_DENIED),
                stderr,
            } => OwnerQueryError::PermissionDenied(stderr),
            other => OwnerQueryError::Query(other.to_string()),
        }
    }
}

impl OwnerQuery for PowerShellBackend {
    fn owner_of(&self, path: &str) -> Result<Option<String>, OwnerQueryError> {
        let out = self
            .runner
            .run(OWNER_SCRIPT, &json!({ "path": path }), self.owner_timeout)
            .map_err(|e| self.owner_error(e))?;
        let answer: OwnerAnswer = serde_json::from_str(&out)
            .map_err(|e| OwnerQueryError::Query(format!("unexpected owner output: {e}")))?;
        if !answer.exists {
            return Ok(None);
        }
        Ok(Some(answer.owner.unwrap_or_default()))
    }

    fn translate(&self, principal: &str) -> Result<String, OwnerQueryError> {
        let out = self
            .runner
            .run(
                TRANSLATE_SCRIPT,
                &json!({ "principal": principal }),
                self.owner_timeout,
            )
            .map_err(|e| self.owner_error(e))?;
        let answer: TranslateAnswer = serde_json::from_str(&out)
            .map_err(|e| OwnerQueryError::Query(format!("unexpected translate output: {e}")))?;
        match (answer.sid, answer.error) {
            (Some(sid), _) => Ok(sid),
            (None, message) => Err(OwnerQueryError::Translate {
                principal: principal.to_string(),
                message: message.unwrap_or_else(|| "no identifier returned".to_string()),
            }),
        }
    }
}

impl DirectoryService for PowerShellBackend {
    fn open_batch(
        &self,
        identifiers: &[String],
        timeout: Duration,
    ) -> Result<Box<dyn DirectoryBatch>, BatchError> {
        let out = self
            .runner
            .run(DIRECTORY_SCRIPT, &json!({ "sids": identifiers }), timeout)
            .map_err(|e| match e {
                ScriptError::Timeout(t) => BatchError::Timeout(t),
                other => BatchError::Failed(other.to_string()),
            })?;
        let snapshot =
            parse_directory_response(&out).map_err(|e| BatchError::Failed(e.to_string()))?;
        tracing::debug!(
            requested = identifiers.len(),
            answered = snapshot.len(),
            "directory script finished"
        );
        Ok(Box::new(snapshot))
    }
}
