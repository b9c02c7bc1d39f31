//! コマンド実行: ビルトイン判定、リダイレクト適用、子プロセス起動、ジョブ登録。
//!
//! - [`execute`]: ビルトインならプロセス内で実行、それ以外は [`launch`] へ
//! - [`launch`]:
//!   - `&` 付きかつ foreground-only モードでなければバックグラウンド扱い
//!   - リダイレクト先を [`Redirections`] として開く（スコープ終了で必ず close）
//!   - `posix_spawnp` で起動（foreground は SIGINT を `SIG_DFL` にリセット）
//!   - background: ジョブテーブルに登録し、`background pid is N` を表示して即座に返る
//!   - foreground: `waitpid` で待機し、`last_status` を更新
//!   - 起動失敗: foreground は診断と `last_status = 1`、background は失敗を報告する子をジョブにする

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};

use crate::builtins;
use crate::error::ShellError;
use crate::job::{self, Termination};
use crate::parser::ParsedCommand;
use crate::shell::Shell;
use crate::spawn;

/// バックグラウンドジョブの stdin/stdout の既定の接続先。
const DEV_NULL: &str = "/dev/null";

/// パース済みコマンドを 1 つ実行する。
///
/// `out` はシェル自身の出力（`status`、`background pid is N` 等）の書き込み先。
/// 子プロセスはシェルの fd 1 を直接継承する。
///
/// `Err` は REPL まで伝播させるエラー。子プロセスを作れなかった場合だけ致命的。
pub fn execute(shell: &mut Shell, cmd: &ParsedCommand, out: &mut dyn Write) -> Result<(), ShellError> {
    let args = cmd.argv();
    if args.is_empty() {
        return Ok(());
    }

    if builtins::is_builtin(args[0]) {
        if cmd.input.is_some() || cmd.output.is_some() || cmd.background {
            log::debug!("{}: redirection and & are ignored for built-ins", args[0]);
        }
        if let Some(result) = builtins::try_exec(shell, &args, out) {
            return result.map_err(ShellError::from);
        }
    }

    launch(shell, cmd, out)
}

// ── リダイレクト ────────────────────────────────────────────────────

/// 子の stdin/stdout に接続するファイル。
///
/// 親側のコピーは `File` の Drop で閉じる。spawn 失敗時も含め、スコープを抜ければ必ず閉じられる。
struct Redirections {
    stdin: Option<File>,
    stdout: Option<File>,
}

impl Redirections {
    /// 明示的なリダイレクト先、またはバックグラウンドなら `/dev/null` を開く。
    ///
    /// 失敗時は診断メッセージを返す。
    fn open(cmd: &ParsedCommand, background: bool) -> Result<Self, String> {
        let stdin = match (&cmd.input, background) {
            (Some(path), _) => Some(
                File::open(path).map_err(|e| format!("cannot open {path} for input: {e}"))?,
            ),
            (None, true) => Some(
                File::open(DEV_NULL).map_err(|e| format!("cannot open {DEV_NULL}: {e}"))?,
            ),
            (None, false) => None,
        };

        let stdout = match (&cmd.output, background) {
            (Some(path), _) => Some(
                create_truncate(path).map_err(|e| format!("cannot open {path} for output: {e}"))?,
            ),
            (None, true) => Some(
                OpenOptions::new()
                    .write(true)
                    .open(DEV_NULL)
                    .map_err(|e| format!("cannot open {DEV_NULL}: {e}"))?,
            ),
            (None, false) => None,
        };

        Ok(Self { stdin, stdout })
    }

    fn stdin_fd(&self) -> Option<RawFd> {
        self.stdin.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn stdout_fd(&self) -> Option<RawFd> {
        self.stdout.as_ref().map(AsRawFd::as_raw_fd)
    }
}

/// `> file`: 作成または切り詰め、パーミッション 0644。
fn create_truncate(path: &str) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
}

// ── 外部コマンド ────────────────────────────────────────────────────

/// 外部コマンドを子プロセスとして起動する。
///
/// foreground-only モードは起動時に 1 回だけ読む。`cmd.background` 自体は書き換えない。
///
/// リダイレクト先が開けない、またはコマンドを起動できない場合:
/// - foreground: 診断を出し、`last_status = 1`
/// - background: 診断を書いて終了コード 1 で終わる子を代わりに作り、通常のジョブとして登録する
fn launch(shell: &mut Shell, cmd: &ParsedCommand, out: &mut dyn Write) -> Result<(), ShellError> {
    let background = cmd.background && !shell.foreground_only();

    if background {
        if let Err(e) = shell.jobs.ensure_room() {
            eprintln!("smallsh: {}: {}", cmd.name(), e);
            return Ok(());
        }
    }

    // 子が書き始める前にシェル側の出力を吐き出す
    out.flush()?;

    let failure = match Redirections::open(cmd, background) {
        Ok(redirections) => {
            let spawned = spawn::spawn(
                &cmd.argv(),
                !background,
                redirections.stdin_fd(),
                redirections.stdout_fd(),
            );
            drop(redirections);

            match spawned {
                Ok(pid) if background => return register_background(shell, pid, out),
                Ok(pid) => return wait_foreground(shell, pid, out),
                Err(e) if e.is_fatal() => return Err(ShellError::Spawn(e)),
                Err(e) => e.to_string(),
            }
        }
        Err(msg) => format!("smallsh: {}", msg),
    };

    if !background {
        eprintln!("{}", failure);
        shell.last_status = 1;
        return Ok(());
    }

    let pid = spawn::spawn_failed(cmd.name(), &failure).map_err(ShellError::Spawn)?;
    register_background(shell, pid, out)
}

/// ジョブテーブルに登録してから `background pid is N` を出力する。
fn register_background(shell: &mut Shell, pid: libc::pid_t, out: &mut dyn Write) -> Result<(), ShellError> {
    shell.jobs.add(pid)?;
    writeln!(out, "background pid is {}", pid)?;
    out.flush()?;
    Ok(())
}

/// フォアグラウンドの子を待ち、`last_status` を更新する。シグナル終了なら表示もする。
fn wait_foreground(shell: &mut Shell, pid: libc::pid_t, out: &mut dyn Write) -> Result<(), ShellError> {
    match job::wait_for_fg(pid)? {
        Termination::Exited(code) => shell.last_status = code,
        Termination::Signaled(signo) => {
            shell.last_status = signo;
            writeln!(out, "{}", Termination::Signaled(signo))?;
            out.flush()?;
        }
    }
    Ok(())
}
