//! シグナル設定: シェル自身の SIGINT 無視と、SIGTSTP による foreground-only モード切り替え。
//!
//! foreground-only モードのフラグは `&'static AtomicBool` として [`install`] と
//! [`Shell`](crate::shell::Shell) の両方に渡される。ハンドラはフラグを [`MODE`] スロット経由で参照し、
//! アトミック操作と `write(2)` 以外は何もしない（async-signal-safe）。
//!
//! 子プロセス側の設定（SIGINT の `SIG_DFL` リセット、SIGTSTP のブロック）は
//! [`spawn`](crate::spawn) の `posix_spawnattr` で行う。

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// foreground-only モードに入ったときの通知。
pub const ENTER_MESSAGE: &str = "\nEntering foreground-only mode (& is now ignored)\n";
/// foreground-only モードを抜けたときの通知。
pub const EXIT_MESSAGE: &str = "\nExiting foreground-only mode\n";

/// ハンドラから参照するモードフラグ。[`install`] で設定される。
static MODE: AtomicPtr<AtomicBool> = AtomicPtr::new(ptr::null_mut());

/// シェルプロセスのシグナル処理を設定する。REPL 開始前に 1 回だけ呼ぶ。
///
/// - SIGINT: `SIG_IGN`（Ctrl+C でシェル自身は終了しない）
/// - SIGTSTP: [`handle_sigtstp`]（停止せず `mode` を反転して通知を出す）
///
/// SIGTSTP ハンドラは実行中に全シグナルをブロックし、`SA_RESTART` で
/// 割り込まれた `read` / `waitpid` を再開させる。
pub fn install(mode: &'static AtomicBool) -> io::Result<()> {
    MODE.store(mode as *const AtomicBool as *mut AtomicBool, Ordering::SeqCst);

    unsafe {
        let mut ignore: libc::sigaction = std::mem::zeroed();
        ignore.sa_sigaction = libc::SIG_IGN;
        libc::sigemptyset(&mut ignore.sa_mask);
        if libc::sigaction(libc::SIGINT, &ignore, ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut toggle: libc::sigaction = std::mem::zeroed();
        toggle.sa_sigaction = handle_sigtstp as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigfillset(&mut toggle.sa_mask);
        toggle.sa_flags = libc::SA_RESTART;
        if libc::sigaction(libc::SIGTSTP, &toggle, ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    log::debug!("signal dispositions installed (SIGINT ignored, SIGTSTP toggles mode)");
    Ok(())
}

/// モードを反転し、反転後のモードを返す。反転後の状態に応じた通知を stdout に直接書く。
///
/// シグナルハンドラ本体。フォーマット関数もロックも使わない。
fn toggle(mode: &AtomicBool) -> bool {
    let was_on = mode.fetch_xor(true, Ordering::SeqCst);
    let msg = if was_on { EXIT_MESSAGE } else { ENTER_MESSAGE };
    unsafe {
        libc::write(
            libc::STDOUT_FILENO,
            msg.as_ptr() as *const libc::c_void,
            msg.len(),
        );
    }
    !was_on
}

extern "C" fn handle_sigtstp(_signo: libc::c_int) {
    let mode = MODE.load(Ordering::SeqCst);
    if mode.is_null() {
        return;
    }
    // install() は &'static しか受け取らないので、非 null なら常に有効
    toggle(unsafe { &*mode });
}
