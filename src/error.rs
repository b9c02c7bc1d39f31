//! REPL まで伝播するエラー。
//!
//! ユーザー入力の誤り（パースエラー、リダイレクト先が開けない、`cd` の失敗、
//! コマンドが見つからない）は発生箇所で診断を出して処理済みとし、ここには来ない。

use std::io;

use thiserror::Error;

use crate::job::JobTableFull;
use crate::spawn::SpawnError;

#[derive(Debug, Error)]
pub enum ShellError {
    /// 子プロセスを作れなかった。シェル全体が終了ステータス 1 で終了する。
    #[error("cannot create child process: {0}")]
    Spawn(#[source] SpawnError),
    #[error(transparent)]
    Jobs(#[from] JobTableFull),
    #[error("output error: {0}")]
    Io(#[from] io::Error),
}

impl ShellError {
    /// REPL を中断すべきなら `true`。
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Spawn(_))
    }
}
