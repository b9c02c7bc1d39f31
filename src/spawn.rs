//! `posix_spawnp()` の安全な Rust ラッパー。
//!
//! fork → 子でシグナル設定・fd 付け替え → exec、という手順を `posix_spawnp` の
//! 属性とファイルアクションで宣言的に表す。exec に失敗した子がシェルのコピーとして
//! 走り続けることはなく、失敗は errno として親に返る。
//!
//! ## 構成
//!
//! | 型 | 役割 |
//! |-----|------|
//! | [`SpawnAttr`] | `posix_spawnattr_t` の RAII ラッパー（SIGINT リセット、SIGTSTP ブロック） |
//! | [`FileActions`] | `posix_spawn_file_actions_t` の RAII ラッパー（stdin/stdout の付け替え） |
//! | [`CStringVec`] | argv 用の NULL 終端ポインタ配列 |
//! | [`spawn`] | 上記を組み合わせて `posix_spawnp` を呼ぶ公開関数 |

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

use thiserror::Error;

// ── エラー型 ──────────────────────────────────────────────────────

/// `posix_spawnp` の失敗を表すエラー。
#[derive(Debug, Error)]
#[error("{command}: {}", describe(.errno))]
pub struct SpawnError {
    /// errno 値。
    pub errno: i32,
    /// コマンド名（エラーメッセージ用）。
    pub command: String,
}

fn describe(errno: &i32) -> String {
    match *errno {
        libc::ENOENT => "no such file or directory".to_string(),
        libc::EACCES => "permission denied".to_string(),
        errno => io::Error::from_raw_os_error(errno).to_string(),
    }
}

impl SpawnError {
    /// 子プロセスそのものを作れなかった（リソース枯渇）なら `true`。シェル全体を終了させる。
    ///
    /// それ以外（コマンドが見つからない、実行権限がない等）は子の exec 失敗に相当し、
    /// 診断を出してループを続ける。
    pub fn is_fatal(&self) -> bool {
        matches!(self.errno, libc::EAGAIN | libc::ENOMEM)
    }
}

// ── SpawnAttr ─────────────────────────────────────────────────────

/// `posix_spawnattr_t` の RAII ラッパー。Drop で自動 destroy。
struct SpawnAttr {
    inner: libc::posix_spawnattr_t,
}

impl SpawnAttr {
    /// `posix_spawnattr_init` で初期化する。
    fn new() -> Self {
        unsafe {
            let mut attr: libc::posix_spawnattr_t = std::mem::zeroed();
            libc::posix_spawnattr_init(&mut attr);
            Self { inner: attr }
        }
    }

    fn add_flags(&mut self, flag: libc::c_int) {
        unsafe {
            let mut flags: libc::c_short = 0;
            libc::posix_spawnattr_getflags(&self.inner, &mut flags);
            flags |= flag as libc::c_short;
            libc::posix_spawnattr_setflags(&mut self.inner, flags);
        }
    }

    /// SIGINT をデフォルトにリセットする。
    ///
    /// シェルは SIGINT を無視しており、無視設定は exec を越えて継承される。
    /// フォアグラウンドの子だけ `SIG_DFL` に戻し、Ctrl+C で終了できるようにする。
    fn set_sigint_default(&mut self) {
        self.add_flags(libc::POSIX_SPAWN_SETSIGDEF);
        unsafe {
            let mut sigset: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut sigset);
            libc::sigaddset(&mut sigset, libc::SIGINT);
            libc::posix_spawnattr_setsigdefault(&mut self.inner, &sigset);
        }
    }

    /// 子のシグナルマスクに SIGTSTP を加える。
    ///
    /// シェルの SIGTSTP ハンドラは exec で `SIG_DFL` に戻るため、ブロックしないと
    /// Ctrl+Z で子が停止し、`WUNTRACED` なしで待っているシェルが戻れなくなる。
    ///
    /// シグナルマスクは exec を越えて継承される。子が起動したプロセス（対話シェル等）も
    /// 自分でブロックを解かない限り Ctrl+Z で停止しない。
    fn block_sigtstp(&mut self) {
        self.add_flags(libc::POSIX_SPAWN_SETSIGMASK);
        unsafe {
            let mut mask: libc::sigset_t = std::mem::zeroed();
            libc::sigprocmask(libc::SIG_BLOCK, std::ptr::null(), &mut mask);
            libc::sigaddset(&mut mask, libc::SIGTSTP);
            libc::posix_spawnattr_setsigmask(&mut self.inner, &mask);
        }
    }

    fn as_ptr(&self) -> *const libc::posix_spawnattr_t {
        &self.inner
    }
}

impl Drop for SpawnAttr {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawnattr_destroy(&mut self.inner);
        }
    }
}

// ── FileActions ───────────────────────────────────────────────────

/// `posix_spawn_file_actions_t` の RAII ラッパー。Drop で自動 destroy。
struct FileActions {
    inner: libc::posix_spawn_file_actions_t,
}

impl FileActions {
    /// `posix_spawn_file_actions_init` で初期化する。
    fn new() -> Self {
        unsafe {
            let mut actions: libc::posix_spawn_file_actions_t = std::mem::zeroed();
            libc::posix_spawn_file_actions_init(&mut actions);
            Self { inner: actions }
        }
    }

    /// 子の標準ストリーム `target` を `fd` に付け替える。元の `fd` は子で閉じる。
    fn bind(&mut self, fd: RawFd, target: RawFd) {
        unsafe {
            libc::posix_spawn_file_actions_adddup2(&mut self.inner, fd, target);
            if fd != target {
                libc::posix_spawn_file_actions_addclose(&mut self.inner, fd);
            }
        }
    }

    fn as_ptr(&self) -> *const libc::posix_spawn_file_actions_t {
        &self.inner
    }
}

impl Drop for FileActions {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawn_file_actions_destroy(&mut self.inner);
        }
    }
}

// ── CStringVec ────────────────────────────────────────────────────

/// argv 用の CString ベクタ。NULL 終端のポインタ配列を構築する。
struct CStringVec {
    _strings: Vec<CString>,
    ptrs: Vec<*mut libc::c_char>,
}

impl CStringVec {
    /// 引数リストから構築する。NUL バイトを含む引数があれば `None`。
    fn from_args(args: &[&str]) -> Option<Self> {
        let strings = args
            .iter()
            .map(|s| CString::new(*s).ok())
            .collect::<Option<Vec<CString>>>()?;
        let mut ptrs: Vec<*mut libc::c_char> = strings
            .iter()
            .map(|s| s.as_ptr() as *mut libc::c_char)
            .collect();
        ptrs.push(std::ptr::null_mut()); // NULL 終端
        Some(Self {
            _strings: strings,
            ptrs,
        })
    }

    /// NULL 終端ポインタ配列を返す。
    fn as_ptr(&self) -> *const *mut libc::c_char {
        self.ptrs.as_ptr()
    }
}

// ── spawn 関数 ────────────────────────────────────────────────────

/// `posix_spawnp` で子プロセスを起動する。成功時は子 PID を返す。
///
/// - `args`: コマンドと引数（`args[0]` がコマンド名、シェルと同じ `PATH` で検索）
/// - `foreground`: `true` なら子の SIGINT を `SIG_DFL` に戻す。`false` なら無視を継承
/// - `stdin_fd`: stdin に接続する fd（`None` なら継承）
/// - `stdout_fd`: stdout に接続する fd（`None` なら継承）
///
/// 子は常に SIGTSTP をブロックした状態で起動される。
/// 渡した fd は親側で引き続き有効なので、閉じるのは呼び出し側の責任。
pub fn spawn(
    args: &[&str],
    foreground: bool,
    stdin_fd: Option<RawFd>,
    stdout_fd: Option<RawFd>,
) -> Result<libc::pid_t, SpawnError> {
    let command = args.first().copied().unwrap_or_default();
    let invalid = || SpawnError {
        errno: libc::EINVAL,
        command: command.to_string(),
    };
    if args.is_empty() {
        return Err(invalid());
    }
    let argv = CStringVec::from_args(args).ok_or_else(invalid)?;

    // 属性: シグナル設定
    let mut attr = SpawnAttr::new();
    if foreground {
        attr.set_sigint_default();
    }
    attr.block_sigtstp();

    // ファイルアクション: stdin/stdout の付け替え
    let mut actions = FileActions::new();
    if let Some(fd) = stdin_fd {
        actions.bind(fd, libc::STDIN_FILENO);
    }
    if let Some(fd) = stdout_fd {
        actions.bind(fd, libc::STDOUT_FILENO);
    }

    // environ を継承
    extern "C" {
        static environ: *const *mut libc::c_char;
    }

    let mut pid: libc::pid_t = 0;

    let ret = unsafe {
        libc::posix_spawnp(
            &mut pid,
            argv.as_ptr().read() as *const libc::c_char,
            actions.as_ptr(),
            attr.as_ptr(),
            argv.as_ptr(),
            environ as *const *mut libc::c_char,
        )
    };

    if ret != 0 {
        return Err(SpawnError {
            errno: ret,
            command: command.to_string(),
        });
    }

    log::debug!("spawned {command} as pid {pid} (foreground: {foreground})");
    Ok(pid)
}

/// 起動できなかったコマンドの代わりに、`message` を stderr に書いて終了コード 1 で終わる子を作る。
///
/// バックグラウンドの起動失敗も PID を持つジョブとして登録し、完了を報告するために使う。
/// fork 後の子は `write(2)` と `_exit(2)` しか呼ばない。
pub fn spawn_failed(command: &str, message: &str) -> Result<libc::pid_t, SpawnError> {
    let line = format!("{message}\n");

    match unsafe { libc::fork() } {
        -1 => Err(SpawnError {
            errno: io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(libc::EAGAIN),
            command: command.to_string(),
        }),
        0 => unsafe {
            libc::write(
                libc::STDERR_FILENO,
                line.as_ptr() as *const libc::c_void,
                line.len(),
            );
            libc::_exit(1)
        },
        pid => {
            log::debug!("{command} could not be started; pid {pid} reports the failure");
            Ok(pid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{wait_for_fg, Termination};
    use serial_test::serial;
    use std::fs::{self, File};
    use std::os::unix::io::AsRawFd;

    #[test]
    fn spawns_and_reports_exit_code() {
        let pid = spawn(&["sh", "-c", "exit 4"], true, None, None).unwrap();
        assert_eq!(wait_for_fg(pid).unwrap(), Termination::Exited(4));
    }

    #[test]
    fn missing_command_is_not_fatal() {
        let err = spawn(&["smallsh-no-such-command"], true, None, None).unwrap_err();
        assert_eq!(err.errno, libc::ENOENT);
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "smallsh-no-such-command: no such file or directory"
        );
    }

    #[test]
    fn resource_exhaustion_is_fatal() {
        let err = SpawnError {
            errno: libc::EAGAIN,
            command: "ls".into(),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn failed_launch_child_exits_1() {
        let pid = spawn_failed("smallsh-no-such-command", "smallsh-no-such-command: no such file or directory")
            .unwrap();
        assert_eq!(wait_for_fg(pid).unwrap(), Termination::Exited(1));
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = spawn(&["echo", "a\0b"], true, None, None).unwrap_err();
        assert_eq!(err.errno, libc::EINVAL);
    }

    #[test]
    fn empty_argv_is_rejected() {
        assert!(spawn(&[], true, None, None).is_err());
    }

    #[test]
    fn binds_stdin_and_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("in.txt");
        let output_path = dir.path().join("out.txt");
        fs::write(&input_path, "one\ntwo\nthree\n").unwrap();

        let input = File::open(&input_path).unwrap();
        let output = File::create(&output_path).unwrap();
        let pid = spawn(
            &["wc", "-l"],
            true,
            Some(input.as_raw_fd()),
            Some(output.as_raw_fd()),
        )
        .unwrap();
        assert_eq!(wait_for_fg(pid).unwrap(), Termination::Exited(0));

        let counted = fs::read_to_string(&output_path).unwrap();
        assert_eq!(counted.trim(), "3");
    }

    #[test]
    #[serial]
    fn sigint_is_reset_only_for_foreground_children() {
        // シェルと同じく SIGINT を無視した状態で起動する
        let previous = unsafe { libc::signal(libc::SIGINT, libc::SIG_IGN) };

        let fg = spawn(&["sleep", "5"], true, None, None).unwrap();
        let bg = spawn(&["sleep", "5"], false, None, None).unwrap();
        unsafe {
            libc::kill(fg, libc::SIGINT);
            libc::kill(bg, libc::SIGINT);
        }

        assert_eq!(wait_for_fg(fg).unwrap(), Termination::Signaled(libc::SIGINT));

        std::thread::sleep(std::time::Duration::from_millis(100));
        let mut raw_status = 0;
        assert_eq!(unsafe { libc::waitpid(bg, &mut raw_status, libc::WNOHANG) }, 0);
        unsafe { libc::kill(bg, libc::SIGTERM) };
        assert_eq!(wait_for_fg(bg).unwrap(), Termination::Signaled(libc::SIGTERM));

        unsafe { libc::signal(libc::SIGINT, previous) };
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn child_blocks_sigtstp() {
        // SigBlk の SIGTSTP ビット（20 番 → bit 19）が立っていることを子自身に確認させる
        let pid = spawn(
            &[
                "sh",
                "-c",
                "mask=$(grep SigBlk /proc/self/status | cut -f2); \
                 [ $(( 0x$mask & 0x80000 )) -ne 0 ]",
            ],
            true,
            None,
            None,
        )
        .unwrap();
        assert_eq!(wait_for_fg(pid).unwrap(), Termination::Exited(0));
    }
}
