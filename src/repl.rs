//! REPL ループ: ジョブ reap → プロンプト表示 → 1 行読み取り → パース → 実行 → ループ。
//!
//! 入力元と出力先は呼び出し側が渡す（バイナリでは stdin / stdout）。
//! 入力の終端や読み取りエラーは「このサイクルはコマンドなし」として扱い、ループを続ける。
//! ループを抜けるのは `exit` ビルトインか、子プロセスを作れなかったときだけ。

use std::io::{BufRead, Write};

use crate::error::ShellError;
use crate::executor;
use crate::parser;
use crate::shell::Shell;

/// プロンプト文字列（改行なし）。
pub const PROMPT: &str = ": ";

/// `exit` が実行されるまで REPL を回す。
///
/// 致命的なエラー（子プロセスを作れない）だけを `Err` で返す。
pub fn run<R: BufRead>(shell: &mut Shell, input: &mut R, out: &mut dyn Write) -> Result<(), ShellError> {
    let mut buf = Vec::new();

    while !shell.should_exit {
        // プロンプト前にバックグラウンドジョブを reap し、完了通知を出力
        if let Err(e) = report_completions(shell, out) {
            log::warn!("failed to write job report: {e}");
        }

        if let Err(e) = write!(out, "{PROMPT}").and_then(|()| out.flush()) {
            log::warn!("failed to write prompt: {e}");
        }

        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => {
                log::debug!("end of input; waiting for the next line");
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("failed to read a line: {e}");
                continue;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        match eval_line(shell, strip_newline(&line), out) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => log::warn!("{e}"),
        }
    }

    Ok(())
}

/// 1 行を評価する。空行・コメント行は何もしない。パースエラーは stderr に報告して `Ok`。
pub fn eval_line(shell: &mut Shell, line: &str, out: &mut dyn Write) -> Result<(), ShellError> {
    match parser::parse(line, shell.pid) {
        Ok(Some(cmd)) => executor::execute(shell, &cmd, out),
        Ok(None) => Ok(()),
        Err(e) => {
            eprintln!("smallsh: {}", e);
            Ok(())
        }
    }
}

/// 終了したバックグラウンドジョブを報告する。
fn report_completions(shell: &mut Shell, out: &mut dyn Write) -> std::io::Result<()> {
    for completion in shell.jobs.poll_all() {
        writeln!(out, "{}", completion)?;
    }
    out.flush()
}

/// 行末の `\n`（と直前の `\r`）を取り除く。
fn strip_newline(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}
