//! Tick driven task queue
//!
//! Every piece of deferred work in the engine runs on the single update
//! thread through this queue: periodic element updates, delayed follow-ups
//! and one-step deferrals of event handling. Time is measured in ticks and
//! only advances when [`UpdateScheduler::advance`] is called.

use log::debug;

/// Cancels a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

#[derive(Debug)]
struct Task<J> {
    id: u64,
    job: J,
    next_run: u64,
    /// Interval for repeating tasks
    period: Option<u64>,
}

#[derive(Debug)]
pub struct UpdateScheduler<J> {
    tick: u64,
    next_id: u64,
    tasks: Vec<Task<J>>,
}

impl<J: Clone> UpdateScheduler<J> {
    pub fn new() -> Self {
        Self {
            tick: 0,
            next_id: 1,
            tasks: Vec::new(),
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Runs `job` every `interval` ticks, the first time `interval` ticks from now.
    pub fn schedule_repeating(&mut self, job: J, interval: u64) -> TaskHandle {
        let interval = interval.max(1);
        self.push(job, interval, Some(interval))
    }

    /// Runs `job` once after `delay` ticks. A delay of zero still waits for
    /// the next tick.
    pub fn schedule_delayed(&mut self, job: J, delay: u64) -> TaskHandle {
        self.push(job, delay.max(1), None)
    }

    /// Stops a task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != handle.0);
        before != self.tasks.len()
    }

    /// Drops every task whose job matches `predicate`.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&J) -> bool) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| !predicate(&task.job));
        before - self.tasks.len()
    }

    /// Moves time forward by one tick and returns the jobs that became due,
    /// in the order they were scheduled.
    pub fn advance(&mut self) -> Vec<J> {
        self.tick += 1;
        let now = self.tick;

        let mut due = Vec::new();
        self.tasks.retain_mut(|task| {
            if task.next_run > now {
                return true;
            }

            due.push((task.id, task.job.clone()));
            match task.period {
                Some(period) => {
                    task.next_run = now + period;
                    true
                }
                None => false,
            }
        });

        due.sort_by_key(|(id, _)| *id);
        if !due.is_empty() {
            debug!("Tick {}: {} scheduled jobs due", now, due.len());
        }
        due.into_iter().map(|(_, job)| job).collect()
    }

    /// Number of tasks still scheduled
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    fn push(&mut self, job: J, delay: u64, period: Option<u64>) -> TaskHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.push(Task {
            id,
            job,
            next_run: self.tick + delay,
            period,
        });
        TaskHandle(id)
    }
}

impl<J: Clone> Default for UpdateScheduler<J> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delayed_job_runs_once() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.schedule_delayed("follow-up", 2);

        assert!(scheduler.advance().is_empty());
        assert_eq!(scheduler.advance(), vec!["follow-up"]);
        assert!(scheduler.advance().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_zero_delay_waits_one_tick() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.schedule_delayed(7, 0);

        assert_eq!(scheduler.advance(), vec![7]);
    }

    #[test]
    fn test_repeating_job() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.schedule_repeating("update", 3);

        let runs: Vec<u64> = (0..9)
            .filter_map(|_| {
                let due = scheduler.advance();
                (!due.is_empty()).then(|| scheduler.current_tick())
            })
            .collect();

        assert_eq!(runs, vec![3, 6, 9]);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_cancel_stops_future_runs() {
        let mut scheduler = UpdateScheduler::new();
        let handle = scheduler.schedule_repeating("update", 1);

        assert_eq!(scheduler.advance().len(), 1);
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        assert!(scheduler.advance().is_empty());
    }

    #[test]
    fn test_due_jobs_keep_scheduling_order() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.schedule_delayed("a", 2);
        scheduler.schedule_repeating("b", 1);
        scheduler.schedule_delayed("c", 1);

        assert_eq!(scheduler.advance(), vec!["b", "c"]);
        assert_eq!(scheduler.advance(), vec!["a", "b"]);
    }

    #[test]
    fn test_cancel_where() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.schedule_delayed(1, 5);
        scheduler.schedule_delayed(2, 5);
        scheduler.schedule_delayed(3, 5);

        assert_eq!(scheduler.cancel_where(|job| *job != 2), 2);
        assert_eq!(scheduler.pending(), 1);
    }
}
