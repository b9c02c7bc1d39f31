//! smallsh: 3 つのビルトインとバックグラウンド実行を持つ小さなシェル
//!
//! 起動手順: ロガー初期化 → シグナル設定 → REPL ループ → 終了。
//! ログは `SMALLSH_LOG`（env_logger の書式、既定 `warn`）で制御し、stderr に出る。

use std::io;
use std::process;
use std::sync::atomic::AtomicBool;

use smallsh::shell::Shell;
use smallsh::{repl, signals};

/// foreground-only モード。SIGTSTP ハンドラと REPL の両方から参照される。
static FOREGROUND_ONLY: AtomicBool = AtomicBool::new(false);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("SMALLSH_LOG", "warn"))
        .format_timestamp(None)
        .init();

    if let Err(e) = signals::install(&FOREGROUND_ONLY) {
        eprintln!("smallsh: cannot install signal handlers: {}", e);
        process::exit(1);
    }

    let mut shell = Shell::new(&FOREGROUND_ONLY);
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();

    if let Err(e) = repl::run(&mut shell, &mut input, &mut out) {
        eprintln!("smallsh: {}", e);
        process::exit(1);
    }
}
