//! トークナイザ: 入力 1 行から [`ParsedCommand`] を構築する。
//!
//! ## 対応構文
//!
//! - 引数: スペース区切り（連続スペースは 1 つの区切りとして扱う。クォート・エスケープなし）
//! - リダイレクト: `< file`（stdin）、`> file`（stdout 上書き）
//! - バックグラウンド実行: 行末の `&`（行末以外の `&` はただの引数）
//! - PID 展開: `$$` → シェル自身の PID（分割前に行全体へ 1 回だけ適用）
//! - コメント: 先頭文字が `#` の行は無視
//!
//! リダイレクト演算子は直後のトークンを無条件にターゲットとして消費する。
//! したがって `cat < &` は `&` という名前のファイルを入力に取り、バックグラウンドにはならない。

use std::borrow::Cow;

use thiserror::Error;

/// 引数リストの上限。超過はパースエラー（切り詰めはしない）。
pub const MAX_ARGS: usize = 512;

// ── AST ─────────────────────────────────────────────────────────────

/// パース済みの単一コマンド。
///
/// `args` は常に 1 要素以上（引数ゼロの行は [`parse`] が `Ok(None)` を返す）。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCommand {
    pub args: Vec<String>,
    /// `< file` で指定された入力ファイル。
    pub input: Option<String>,
    /// `> file` で指定された出力ファイル。
    pub output: Option<String>,
    /// 行末に `&` が指定された場合に `true`。foreground-only モードでも書き換えない。
    pub background: bool,
}

impl ParsedCommand {
    /// コマンド名（`args[0]`）。
    pub fn name(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    /// 引数を `&str` のスライスとして借用する。builtins / spawn 呼び出し用。
    pub fn argv(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

// ── Error ───────────────────────────────────────────────────────────

/// パース時に発生しうるエラー。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// リダイレクト演算子（`<` / `>`）の後にターゲットファイル名がない。
    #[error("syntax error: missing redirect target after `{0}`")]
    MissingRedirectTarget(char),
    /// 引数が [`MAX_ARGS`] を超えた。
    #[error("too many arguments (limit is {limit})")]
    TooManyArguments { limit: usize },
}

// ── PID expansion ───────────────────────────────────────────────────

/// `$$` を `pid` の 10 進表記に置換する。左から重複なしで走査するので `$$$` → `<pid>$`。
/// `$$` を含まない行はゼロコピーで返す。
pub fn expand_pid(line: &str, pid: u32) -> Cow<'_, str> {
    if line.contains("$$") {
        Cow::Owned(line.replace("$$", &pid.to_string()))
    } else {
        Cow::Borrowed(line)
    }
}

/// 空行（空白のみ）または先頭文字が `#` のコメント行なら `true`。
pub fn is_blank_or_comment(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with('#')
}

// ── Parser ──────────────────────────────────────────────────────────

/// 1 行をパースする。
///
/// 戻り値:
/// - `Ok(Some(cmd))`: 実行すべきコマンド
/// - `Ok(None)`: 空行・コメント行・引数ゼロの行（リダイレクトのみ、`&` のみ）
/// - `Err(e)`: ターゲットのないリダイレクト、引数の上限超過
pub fn parse(line: &str, pid: u32) -> Result<Option<ParsedCommand>, ParseError> {
    if is_blank_or_comment(line) {
        return Ok(None);
    }

    let expanded = expand_pid(line, pid);
    let tokens: Vec<&str> = expanded.split(' ').filter(|t| !t.is_empty()).collect();

    let mut cmd = ParsedCommand::default();
    let mut iter = tokens.iter().enumerate();

    while let Some((i, &token)) = iter.next() {
        match token {
            "<" => {
                let (_, target) = iter.next().ok_or(ParseError::MissingRedirectTarget('<'))?;
                cmd.input = Some(target.to_string());
            }
            ">" => {
                let (_, target) = iter.next().ok_or(ParseError::MissingRedirectTarget('>'))?;
                cmd.output = Some(target.to_string());
            }
            "&" if i == tokens.len() - 1 => cmd.background = true,
            _ => {
                if cmd.args.len() == MAX_ARGS {
                    return Err(ParseError::TooManyArguments { limit: MAX_ARGS });
                }
                cmd.args.push(token.to_string());
            }
        }
    }

    if cmd.args.is_empty() {
        return Ok(None);
    }
    Ok(Some(cmd))
}
