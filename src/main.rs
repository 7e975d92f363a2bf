//! # jobchain_demo
//! Schedules a batch of jobs and a small chain, then prints every job's report as JSON.
//!
//! Configured through the environment, see [`jobchain::Config::from_env`].

use std::{env, time::Duration};

use jobchain::{job::hooks, Aggregate, Job, Report, Scheduler};

/// Entry point
pub fn main() -> jobchain::Result<()> {
  init_logger();

  let scheduler = Scheduler::from_env();
  log::info!("{:?}", scheduler);

  let mut reports = batch(&scheduler)?;
  reports.extend(chain(&scheduler)?);

  match serde_json::to_string_pretty(&reports) {
    | Ok(json) => println!("{}", json),
    | Err(e) => log::error!("failed to serialize reports: {}", e),
  }

  scheduler.shutdown(Duration::from_millis(200));
  Ok(())
}

/// 100 independent jobs, joined with an [`Aggregate`]
fn batch(scheduler: &Scheduler) -> jobchain::Result<Vec<Report>> {
  let jobs = (0..100u64).map(|n| {
                          Job::builder().name(format!("batch-{}", n))
                                        .listener(hooks::logging())
                                        .computation(|ms: &u64| {
                                          std::thread::sleep(Duration::from_millis(*ms));
                                          Ok::<_, String>(ms * 2)
                                        })
                                        .build()
                        })
                        .collect::<Vec<Job<u64, u64>>>();

  let refs = jobs.iter().collect::<Vec<_>>();
  let joined = Aggregate::new(&refs, |outputs: Vec<u64>| {
    log::info!("batch: all {} done, sum {}", outputs.len(), outputs.iter().sum::<u64>());
  });

  let futures = jobs.iter()
                    .enumerate()
                    .map(|(n, job)| scheduler.schedule(job, n as u64 % 10))
                    .collect::<jobchain::Result<Vec<_>>>()?;

  for fut in futures {
    fut.get()?;
  }

  log::info!("batch: joined = {}", joined.is_ready());
  Ok(jobs.iter().map(Job::report).collect())
}

/// `10 -> x * x -> to_string -> len`
fn chain(scheduler: &Scheduler) -> jobchain::Result<Vec<Report>> {
  let square = Job::builder().name("square")
                             .listener(hooks::logging())
                             .computation(|x: &u64| Ok::<_, String>(x * x))
                             .build();

  let digits = Job::builder().name("digits")
                             .listener(hooks::logging())
                             .computation(|s: &String| Ok::<_, String>(s.len()))
                             .build();

  let digits_fut = scheduler.schedule_after(&digits, &square, |n: &u64| n.to_string())?;
  scheduler.schedule_in(&square, 10, Duration::from_millis(50))?;

  log::info!("chain: 10 squared has {} digits", digits_fut.get()?);
  Ok(vec![square.report(), digits.report()])
}

fn init_logger() {
  if env::var_os("RUST_LOG").is_none() {
    env::set_var("RUST_LOG", "jobchain=debug,jobchain_demo=debug");
  }

  pretty_env_logger::init();
}
