use std::{sync::{Arc, Mutex},
          time::Duration};

use jobchain::{Aggregate, Config, Job, Scheduler};
use proptest::prelude::*;

fn init() {
  simple_logger::SimpleLogger::new().init().ok();
}

fn jobs(n: usize) -> Vec<Job<u32, u32>> {
  (0..n).map(|i| Job::named(format!("part-{}", i), |x: &u32| Ok::<_, String>(x * 10)))
        .collect()
}

/// Every callback invocation, with the outputs it got
type Calls = Arc<Mutex<Vec<Vec<u32>>>>;

fn join(jobs: &[Job<u32, u32>]) -> (Aggregate<u32>, Calls) {
  let calls = Calls::default();
  let refs = jobs.iter().collect::<Vec<_>>();
  let agg = Aggregate::new(&refs, {
    let calls = calls.clone();
    move |outputs| calls.lock().unwrap().push(outputs)
  });

  (agg, calls)
}

// completion order, a permutation of 0..n for 1 <= n < 8
fn completion_order() -> impl Strategy<Value = Vec<usize>> {
  (1usize..8).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
  #[test]
  fn fires_once_with_outputs_by_index(order in completion_order()) {
    init();
    let jobs = jobs(order.len());
    let (agg, calls) = join(&jobs);

    for (done, &i) in order.iter().enumerate() {
      prop_assert!(!agg.is_ready());
      prop_assert!(calls.lock().unwrap().is_empty(), "fired after {} of {}", done, order.len());
      jobs[i].run(i as u32).unwrap();
    }

    let expected = (0..order.len() as u32).map(|i| i * 10).collect::<Vec<_>>();
    prop_assert!(agg.is_ready());
    prop_assert_eq!(calls.lock().unwrap().clone(), vec![expected]);
  }
}

#[test]
fn empty_join_is_ready_immediately() {
  init();
  let (agg, calls) = join(&[]);

  assert!(agg.is_ready());
  assert_eq!(*calls.lock().unwrap(), vec![Vec::<u32>::new()]);
}

#[test]
fn failed_part_keeps_the_join_pending() {
  init();
  let ok = Job::named("ok", |x: &u32| Ok::<_, String>(*x));
  let broken = Job::<u32, u32>::named("broken", |_: &u32| Err("no"));
  let calls = Calls::default();

  let agg = Aggregate::new(&[&ok, &broken], {
    let calls = calls.clone();
    move |outputs| calls.lock().unwrap().push(outputs)
  });

  ok.run(1).unwrap();
  broken.run(2).unwrap_err();

  assert!(!agg.is_ready());
  assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn joins_scheduled_jobs() {
  init();
  let scheduler = Scheduler::with_config(Config { shutdown_grace: Duration::from_millis(500),
                                                  ..Config::default() });
  let jobs = jobs(16);
  let (agg, calls) = join(&jobs);

  let futures = jobs.iter()
                    .enumerate()
                    .map(|(i, job)| scheduler.schedule_in(job, i as u32, Duration::from_millis((16 - i as u64) * 5)))
                    .collect::<Result<Vec<_>, _>>()
                    .unwrap();

  futures.iter().for_each(|f| {
                  f.get().unwrap();
                });

  assert!(agg.is_ready());
  assert_eq!(calls.lock().unwrap().len(), 1);
  assert_eq!(calls.lock().unwrap()[0], (0..16).map(|i| i * 10).collect::<Vec<u32>>());
}
