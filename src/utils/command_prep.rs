use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Matches the recursive "empty this directory" idiom used by scaffold
/// templates: `rm -rf ./* ./.[!.]*` (optionally with trailing redirects).
fn cleanup_idiom() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"rm\s+-rf\s+\./\*\s+\./\.\[!\.\]\*.*$").unwrap())
}

fn python3_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bpython3\b").unwrap())
}

/// Preprocesses a template command to make it cross-platform compatible.
///
/// Substitutions are computed host-side rather than left to shell expansion,
/// since the target shell differs by platform:
/// - `$(basename $PWD)` becomes the quoted base name of `cwd`.
/// - The recursive glob-delete idiom becomes the platform equivalent.
/// - `python3` becomes `python` on Windows.
pub fn preprocess_command(command: &str, cwd: &Path) -> String {
    let mut processed = command.to_string();

    if processed.contains("$(basename $PWD)") {
        let dir_name = cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        processed = processed.replace("$(basename $PWD)", &format!("\"{}\"", dir_name));
    }

    if cleanup_idiom().is_match(&processed) {
        processed = if cfg!(windows) {
            "powershell -Command \"Get-ChildItem -Force | Remove-Item -Recurse -Force -ErrorAction SilentlyContinue\"".to_string()
        } else {
            "rm -rf ./* ./.[!.]* 2>/dev/null || true".to_string()
        };
    }

    if cfg!(windows) && processed.contains("python3") {
        processed = python3_word().replace_all(&processed, "python").into_owned();
    }

    processed
}

/// Strips ANSI escape sequences from command output so progress previews
/// stay readable in plain-text transports.
pub fn strip_ansi(input: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"[\x1b\x9b][\[()#;?]*(?:[0-9]{1,4}(?:;[0-9]{0,4})*)?[0-9A-ORZcf-nqry=><]")
            .unwrap()
    });
    re.replace_all(input, "").into_owned()
}
