//! ジョブテーブルとジョブ制御ヘルパー。
//!
//! バックグラウンドジョブの登録 ([`JobTable::add`])、プロンプト前の非ブロッキング reap
//! ([`JobTable::poll_all`])、終了時の一括 SIGTERM ([`JobTable::terminate_all`])、
//! フォアグラウンド待機 ([`wait_for_fg`]) を提供する。

use std::fmt;
use std::io;

use libc::pid_t;
use thiserror::Error;

/// ジョブテーブルの容量。
pub const MAX_JOBS: usize = 100;

// ── 終了状態 ─────────────────────────────────────────────────────────

/// `waitpid` が返した raw status を解釈した終了状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// 正常終了。引数は終了コード。
    Exited(i32),
    /// シグナルで終了。引数はシグナル番号。
    Signaled(i32),
}

impl Termination {
    /// raw status を解釈する。停止・再開の通知なら `None`。
    pub fn from_raw(raw_status: i32) -> Option<Self> {
        if libc::WIFEXITED(raw_status) {
            Some(Self::Exited(libc::WEXITSTATUS(raw_status)))
        } else if libc::WIFSIGNALED(raw_status) {
            Some(Self::Signaled(libc::WTERMSIG(raw_status)))
        } else {
            None
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit value {code}"),
            Self::Signaled(signo) => write!(f, "terminated by signal {signo}"),
        }
    }
}

/// バックグラウンドジョブの完了報告。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub pid: pid_t,
    pub termination: Termination,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "background pid {} is done: {}", self.pid, self.termination)
    }
}

// ── JobTable ─────────────────────────────────────────────────────────

/// テーブルが満杯で登録できなかった。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("too many background jobs (limit is {capacity})")]
pub struct JobTableFull {
    pub capacity: usize,
}

/// 未回収のバックグラウンド PID を起動順に保持する。
///
/// [`Shell`](crate::shell::Shell) が唯一の所有者。PID を他で保持するコンポーネントはない。
#[derive(Debug)]
pub struct JobTable {
    pids: Vec<pid_t>,
    capacity: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self::with_capacity(MAX_JOBS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pids: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// PID を末尾に追加する。満杯なら [`JobTableFull`]。
    pub fn add(&mut self, pid: pid_t) -> Result<(), JobTableFull> {
        self.ensure_room()?;
        self.pids.push(pid);
        Ok(())
    }

    /// 空きがなければ [`JobTableFull`]。起動前の確認に使う。
    pub fn ensure_room(&self) -> Result<(), JobTableFull> {
        if self.is_full() {
            return Err(JobTableFull {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.pids.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    /// 登録順の PID イテレータ。
    pub fn iter(&self) -> impl Iterator<Item = pid_t> + '_ {
        self.pids.iter().copied()
    }

    /// 全 PID に `waitpid(pid, WNOHANG)` を発行し、終了したものをテーブルから除いて返す。
    ///
    /// 残ったジョブの相対順序は保たれる。完了報告はテーブル順。
    /// プロンプト表示前に毎サイクル呼ばれる。
    pub fn poll_all(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        self.pids.retain(|&pid| {
            let mut raw_status: i32 = 0;
            let ret = unsafe { libc::waitpid(pid, &mut raw_status, libc::WNOHANG) };

            if ret == 0 {
                return true; // 実行中
            }
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    return true; // 次のサイクルで再試行
                }
                log::warn!("dropping background pid {pid}: waitpid failed: {err}");
                return false;
            }

            match Termination::from_raw(raw_status) {
                Some(termination) => {
                    log::debug!("reaped background pid {pid}: {termination}");
                    done.push(Completion { pid, termination });
                    false
                }
                None => true,
            }
        });
        done
    }

    /// 全ジョブに SIGTERM を送り、テーブルを空にする。終了は待たない。
    ///
    /// シェル終了時（`exit` ビルトイン）にのみ使う。
    pub fn terminate_all(&mut self) {
        for pid in self.pids.drain(..) {
            log::debug!("sending SIGTERM to background pid {pid}");
            if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
                log::warn!(
                    "kill({pid}, SIGTERM) failed: {}",
                    io::Error::last_os_error()
                );
            }
        }
    }
}

// ── 待機ヘルパー ─────────────────────────────────────────────────────

/// フォアグラウンドの子 `pid` が終了するまでブロックする。
///
/// `WUNTRACED` は付けない（子は SIGTSTP をブロックした状態で起動されるため停止しない）。
/// EINTR は再試行する。
pub fn wait_for_fg(pid: pid_t) -> io::Result<Termination> {
    loop {
        let mut raw_status: i32 = 0;
        let ret = unsafe { libc::waitpid(pid, &mut raw_status, 0) };

        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }

        if let Some(termination) = Termination::from_raw(raw_status) {
            return Ok(termination);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spawn;
    use std::time::{Duration, Instant};

    fn spawn_bg(args: &[&str]) -> pid_t {
        spawn::spawn(args, false, None, None).unwrap()
    }

    /// `poll_all` を完了が `n` 件集まるまで繰り返す。
    fn poll_until(table: &mut JobTable, n: usize) -> Vec<Completion> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut done = Vec::new();
        while done.len() < n && Instant::now() < deadline {
            done.extend(table.poll_all());
            std::thread::sleep(Duration::from_millis(10));
        }
        done
    }

    // ── Termination ──

    #[test]
    fn termination_display() {
        assert_eq!(Termination::Exited(0).to_string(), "exit value 0");
        assert_eq!(Termination::Signaled(15).to_string(), "terminated by signal 15");
    }

    #[test]
    fn completion_display() {
        let c = Completion {
            pid: 4242,
            termination: Termination::Exited(1),
        };
        assert_eq!(c.to_string(), "background pid 4242 is done: exit value 1");
    }

    // ── テーブル操作 ──

    #[test]
    fn add_fails_loudly_at_capacity() {
        let mut table = JobTable::with_capacity(2);
        table.add(10).unwrap();
        assert_eq!(table.ensure_room(), Ok(()));
        table.add(11).unwrap();
        assert!(table.is_full());
        assert_eq!(table.ensure_room(), Err(JobTableFull { capacity: 2 }));
        assert_eq!(table.add(12), Err(JobTableFull { capacity: 2 }));
        assert_eq!(table.iter().collect::<Vec<_>>(), vec![10, 11]);
    }

    #[test]
    fn default_capacity() {
        let mut table = JobTable::new();
        for pid in 0..MAX_JOBS as pid_t {
            table.add(100_000 + pid).unwrap();
        }
        assert!(table.add(1).is_err());
    }

    // ── reap ──

    #[test]
    fn poll_all_reports_exit_and_removes() {
        let mut table = JobTable::new();
        let pid = spawn_bg(&["sh", "-c", "exit 3"]);
        table.add(pid).unwrap();

        let done = poll_until(&mut table, 1);
        assert_eq!(
            done,
            vec![Completion {
                pid,
                termination: Termination::Exited(3)
            }]
        );
        assert!(table.is_empty());
        // 二重報告しない
        assert!(table.poll_all().is_empty());
    }

    #[test]
    fn poll_all_keeps_running_jobs_in_order() {
        let mut table = JobTable::new();
        let slow_a = spawn_bg(&["sleep", "5"]);
        let fast = spawn_bg(&["true"]);
        let slow_b = spawn_bg(&["sleep", "5"]);
        for pid in [slow_a, fast, slow_b] {
            table.add(pid).unwrap();
        }

        let done = poll_until(&mut table, 1);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].pid, fast);
        assert_eq!(table.iter().collect::<Vec<_>>(), vec![slow_a, slow_b]);

        table.terminate_all();
        for pid in [slow_a, slow_b] {
            assert_eq!(wait_for_fg(pid).unwrap(), Termination::Signaled(libc::SIGTERM));
        }
    }

    #[test]
    fn poll_all_reports_signal() {
        let mut table = JobTable::new();
        let pid = spawn_bg(&["sleep", "5"]);
        table.add(pid).unwrap();
        unsafe { libc::kill(pid, libc::SIGKILL) };

        let done = poll_until(&mut table, 1);
        assert_eq!(done[0].termination, Termination::Signaled(libc::SIGKILL));
    }

    #[test]
    fn poll_all_drops_unknown_pid() {
        let mut table = JobTable::new();
        // 自分の子ではない PID（init）は ECHILD で除去される
        table.add(1).unwrap();
        assert!(table.poll_all().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn terminate_all_signals_and_empties() {
        let mut table = JobTable::new();
        let pid = spawn_bg(&["sleep", "5"]);
        table.add(pid).unwrap();

        table.terminate_all();
        assert!(table.is_empty());
        assert_eq!(wait_for_fg(pid).unwrap(), Termination::Signaled(libc::SIGTERM));
    }

    // ── フォアグラウンド待機 ──

    #[test]
    fn wait_for_fg_returns_exit_code() {
        let pid = spawn::spawn(&["sh", "-c", "exit 7"], true, None, None).unwrap();
        assert_eq!(wait_for_fg(pid).unwrap(), Termination::Exited(7));
    }

    #[test]
    fn wait_for_fg_on_non_child_is_an_error() {
        assert!(wait_for_fg(1).is_err());
    }
}
