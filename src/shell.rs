//! シェルのグローバル状態を保持するモジュール。
//!
//! 直前のフォアグラウンド終了ステータス、`exit` 要求、ジョブテーブル、
//! シェル自身の PID（`$$` 展開用）、foreground-only モードのフラグを持つ。

use std::sync::atomic::{AtomicBool, Ordering};

use crate::job::JobTable;

/// シェルの実行状態。REPLループ全体で共有される。
pub struct Shell {
    /// 直前のフォアグラウンド外部コマンドの終了ステータス。シグナル終了ならシグナル番号。
    /// `status` ビルトインで表示する。ビルトイン自身は更新しない。
    pub last_status: i32,
    /// `exit` ビルトインで true にセットされ、REPLループを終了させる。
    pub should_exit: bool,
    /// バックグラウンドジョブのテーブル。
    pub jobs: JobTable,
    /// シェル自身の PID。`$$` 展開に使う。
    pub pid: u32,
    /// foreground-only モード。SIGTSTP ハンドラだけが書き換える。
    foreground_only: &'static AtomicBool,
}

impl Shell {
    /// `foreground_only` は [`signals::install`](crate::signals::install) に渡したものと同じフラグ。
    pub fn new(foreground_only: &'static AtomicBool) -> Self {
        Self {
            last_status: 0,
            should_exit: false,
            jobs: JobTable::new(),
            pid: std::process::id(),
            foreground_only,
        }
    }

    /// foreground-only モードが有効なら `true`。`&` が無視される。
    pub fn foreground_only(&self) -> bool {
        self.foreground_only.load(Ordering::SeqCst)
    }
}
