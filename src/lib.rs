//! smallsh ライブラリ: テスト・ベンチマーク用にモジュールを公開する。
//!
//! バイナリ本体は `main.rs`（ロガー初期化、シグナル設定、REPL 起動）。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`parser`] | トークナイザ（スペース区切り、`<`/`>` リダイレクト、行末 `&`、`$$` 展開） |
//! | [`signals`] | シグナル設定（SIGINT 無視、SIGTSTP で foreground-only モード切り替え） |
//! | [`job`] | ジョブテーブル（バックグラウンド PID、非ブロッキング reap、終了時 SIGTERM、フォアグラウンド待機） |
//! | [`builtins`] | ビルトイン（`exit`, `cd`, `status`） |
//! | [`executor`] | コマンド実行（ビルトイン判定、リダイレクト、起動、待機、ジョブ登録） |
//! | [`spawn`] | `posix_spawnp` ラッパー（子のシグナル設定と stdin/stdout の付け替え） |
//! | [`repl`] | REPL ループ（reap → プロンプト → 読み取り → 実行） |
//! | [`shell`] | シェルのグローバル状態（終了ステータス、ジョブテーブル、foreground-only フラグ） |
//! | [`error`] | REPL まで伝播するエラー |

pub mod builtins;
pub mod error;
pub mod executor;
pub mod job;
pub mod parser;
pub mod repl;
pub mod shell;
pub mod signals;
pub mod spawn;
