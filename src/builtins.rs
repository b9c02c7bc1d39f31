//! ビルトインコマンドの実装。
//!
//! ビルトインは fork/exec を経由せずシェルのプロセス内で同期的に実行される。
//! `try_exec()` が `Some(result)` を返せばビルトインとして処理済み、
//! `None` なら外部コマンドとして executor に委ねる。
//!
//! ビルトインは `last_status` を更新しない（更新するのはフォアグラウンドの外部コマンドだけ）。

use std::env;
use std::io::{self, Write};
use std::path::Path;

use crate::shell::Shell;

/// 名前がビルトインなら `true`。
pub fn is_builtin(name: &str) -> bool {
    matches!(name, "exit" | "cd" | "status")
}

/// ビルトインコマンドの実行を試みる。
///
/// 戻り値:
/// - `Some(Ok(()))`: ビルトインとして実行済み
/// - `Some(Err(e))`: ビルトインだが `out` への書き込みに失敗した
/// - `None`: 該当するビルトインなし（外部コマンドとして実行すべき）
pub fn try_exec(shell: &mut Shell, args: &[&str], out: &mut dyn Write) -> Option<io::Result<()>> {
    match *args.first()? {
        "exit" => Some(Ok(builtin_exit(shell))),
        "cd" => Some(Ok(builtin_cd(args))),
        "status" => Some(builtin_status(shell, out)),
        _ => None,
    }
}

/// `exit`: 全バックグラウンドジョブに SIGTERM を送り、REPLループの終了を要求する。
///
/// プロセス終了はループの呼び出し側に任せる。引数は無視する。
fn builtin_exit(shell: &mut Shell) {
    shell.jobs.terminate_all();
    shell.should_exit = true;
}

/// `cd [dir]`: カレントディレクトリを変更する。引数省略時は `$HOME` に移動。
/// 失敗は stderr に報告するだけで、カレントディレクトリは変わらない。
fn builtin_cd(args: &[&str]) {
    let target = match args.get(1) {
        Some(dir) => dir.to_string(),
        None => match env::var("HOME") {
            Ok(home) => home,
            Err(_) => {
                eprintln!("smallsh: cd: HOME not set");
                return;
            }
        },
    };

    if let Err(e) = env::set_current_dir(Path::new(&target)) {
        eprintln!("smallsh: cd: {}: {}", target, e);
    }
}

/// `status`: 直前のフォアグラウンドコマンドの終了ステータスを表示する。
fn builtin_status(shell: &Shell, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "exit value {}", shell.last_status)?;
    out.flush()
}
