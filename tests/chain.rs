use std::{sync::{atomic::{AtomicBool, AtomicUsize, Ordering},
                 Arc},
          thread,
          time::Duration};

use jobchain::{job::hooks, Config, Error, Event, Job, Scheduler, State};

fn init() -> Scheduler {
  simple_logger::SimpleLogger::new().init().ok();
  Scheduler::with_config(Config { shutdown_grace: Duration::from_millis(500),
                                  keep_alive: Duration::from_millis(200),
                                  thread_name: "chain-worker".into() })
}

fn square() -> Job<u64, u64> {
  Job::named("square", |x: &u64| Ok::<_, String>(x * x))
}

/// `len` of its input, flipping `ran` when invoked
fn digits(ran: Arc<AtomicBool>) -> Job<String, usize> {
  Job::named("digits", move |s: &String| {
    ran.store(true, Ordering::SeqCst);
    Ok::<_, String>(s.len())
  })
}

#[test]
fn square_to_string_len() {
  let scheduler = init();
  let ran = Arc::new(AtomicBool::new(false));
  let square = square();
  let digits = digits(ran.clone());

  let digits_fut = scheduler.schedule_after(&digits, &square, |n: &u64| n.to_string())
                            .unwrap();
  assert_eq!(digits.state(), State::Scheduled);

  let square_fut = scheduler.schedule(&square, 10).unwrap();

  assert_eq!(square_fut.get().unwrap(), 100);
  assert_eq!(digits_fut.get().unwrap(), 3);
  assert!(ran.load(Ordering::SeqCst));
  assert_eq!(digits.state(), State::Done);
}

#[test]
fn downstream_receives_exactly_the_transformed_output() {
  let scheduler = init();
  let upstream = Job::named("words", |s: &&'static str| Ok::<_, String>(s.split(' ').count()));
  let downstream = Job::named("echo", |n: &(usize, bool)| Ok::<_, String>(*n));

  let fut = scheduler.schedule_after(&downstream, &upstream, |n: &usize| (*n, n % 2 == 0))
                     .unwrap();
  scheduler.schedule(&upstream, "a b c").unwrap();

  assert_eq!(fut.get().unwrap(), (3, false));
}

#[test]
fn chain_passes_output_through() {
  let scheduler = init();
  let upstream = square();
  let downstream = Job::named("plus-one", |x: &u64| Ok::<_, String>(x + 1));

  let fut = scheduler.chain(&downstream, &upstream).unwrap();
  scheduler.schedule(&upstream, 4).unwrap();

  assert_eq!(fut.get().unwrap(), 17);
}

#[test]
fn chains_can_be_longer_than_two() {
  let scheduler = init();
  let a = square();
  let b = Job::named("b", |x: &u64| Ok::<_, String>(x + 1));
  let c = Job::named("c", |x: &u64| Ok::<_, String>(x * 10));

  let c_fut = scheduler.chain(&c, &b).unwrap();
  scheduler.chain_in(&b, &a, Duration::from_millis(20)).unwrap();
  scheduler.schedule(&a, 3).unwrap();

  assert_eq!(c_fut.get().unwrap(), 100);
}

#[test]
fn already_finished_upstream_schedules_nothing() {
  let scheduler = init();
  let ran = Arc::new(AtomicBool::new(false));
  let square = square();
  let digits = digits(ran.clone());
  square.run(10).unwrap();

  let err = scheduler.schedule_after(&digits, &square, |n: &u64| n.to_string())
                     .unwrap_err();

  assert!(matches!(err, Error::AlreadyFinished { ref later, ref earlier }
                        if later == "digits" && earlier == "square"));
  assert_eq!(digits.state(), State::Ready);
  assert_eq!(square.listener_count(), 0);
  assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn upstream_failure_cancels_downstream() {
  let scheduler = init();
  let ran = Arc::new(AtomicBool::new(false));
  let failures = Arc::new(AtomicUsize::new(0));

  let upstream = Job::<u64, u64>::builder().name("broken")
                                           .listener(hooks::on_event({
                                             let failures = failures.clone();
                                             move |_: &Job<u64, u64>, e: Event<'_, u64, u64>| {
                                               if let Event::Failed(_) = e {
                                                 failures.fetch_add(1, Ordering::SeqCst);
                                               }
                                             }
                                           }))
                                           .computation(|_: &u64| Err("broken"))
                                           .build();
  let downstream = digits(ran.clone());

  let fut = scheduler.schedule_after(&downstream, &upstream, |n: &u64| n.to_string())
                     .unwrap();
  assert!(scheduler.schedule(&upstream, 1).unwrap().get().is_err());

  assert!(matches!(fut.get(), Err(Error::Canceled { .. })));
  assert!(fut.is_cancelled());
  assert_eq!(upstream.state(), State::Failed);
  assert_eq!(downstream.state(), State::Canceled);
  assert_eq!(failures.load(Ordering::SeqCst), 1);
  assert!(!ran.load(Ordering::SeqCst));
  assert!(downstream.statistics().started_at.is_none());
}

#[test]
fn upstream_canceled_before_start_cancels_downstream() {
  let scheduler = init();
  let ran = Arc::new(AtomicBool::new(false));
  let square = square();
  let digits = digits(ran.clone());

  let digits_fut = scheduler.schedule_after(&digits, &square, |n: &u64| n.to_string())
                            .unwrap();
  let square_fut = scheduler.schedule_in(&square, 10, Duration::from_millis(200))
                            .unwrap();

  assert!(square_fut.cancel(false));

  assert!(digits_fut.is_cancelled());
  assert!(matches!(digits_fut.get(), Err(Error::Canceled { .. })));
  assert_eq!(square.state(), State::Canceled);
  assert_eq!(digits.state(), State::Canceled);

  thread::sleep(Duration::from_millis(300));
  assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn waiting_downstream_occupies_no_worker() {
  let scheduler = init();
  let upstream = square();
  let waiting = (0..10).map(|n| {
                         let job = Job::named(format!("waiting-{}", n), |x: &u64| Ok::<_, String>(*x));
                         (scheduler.chain(&job, &upstream).unwrap(), job)
                       })
                       .collect::<Vec<_>>();

  assert_eq!(scheduler.workers(), 0);
  assert_eq!(upstream.listener_count(), 10);

  scheduler.schedule(&upstream, 2).unwrap();

  for (fut, job) in waiting {
    assert_eq!(fut.get().unwrap(), 4);
    assert_eq!(job.state(), State::Done);
  }
}

#[test]
fn cancelling_a_waiting_chain_detaches_it() {
  let scheduler = init();
  let ran = Arc::new(AtomicBool::new(false));
  let square = square();
  let digits = digits(ran.clone());

  let fut = scheduler.schedule_after(&digits, &square, |n: &u64| n.to_string())
                     .unwrap();
  assert_eq!(square.listener_count(), 1);

  assert!(fut.cancel(false));
  assert_eq!(square.listener_count(), 0);
  assert_eq!(digits.state(), State::Canceled);

  // upstream still runs fine on its own
  assert_eq!(scheduler.schedule(&square, 3).unwrap().get().unwrap(), 9);
  thread::sleep(Duration::from_millis(50));
  assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn upstream_done_after_shutdown_cancels_downstream() {
  let scheduler = init();
  let ran = Arc::new(AtomicBool::new(false));
  let square = square();
  let digits = digits(ran.clone());

  let fut = scheduler.schedule_after(&digits, &square, |n: &u64| n.to_string())
                     .unwrap();
  scheduler.shutdown(Duration::from_secs(0));

  // run directly; the continuation can't reach the closed pool
  assert_eq!(square.run(10).unwrap(), 100);

  assert!(matches!(fut.get(), Err(Error::SchedulerClosed)));
  assert_eq!(digits.state(), State::Canceled);
  assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn panicking_transform_cancels_downstream() {
  let scheduler = init();
  let ran = Arc::new(AtomicBool::new(false));
  let square = square();
  let digits = digits(ran.clone());

  let fut = scheduler.schedule_after(&digits, &square, |_: &u64| -> String { panic!("bad transform") })
                     .unwrap();
  scheduler.schedule(&square, 2).unwrap().get().unwrap();

  assert!(fut.is_cancelled());
  assert_eq!(digits.state(), State::Canceled);
  assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn chained_job_without_computation_is_refused() {
  let scheduler = init();
  let square = square();
  let empty = Job::<String, usize>::builder().name("empty").build();

  let err = scheduler.schedule_after(&empty, &square, |n: &u64| n.to_string())
                     .unwrap_err();

  assert!(matches!(err, Error::UndefinedComputation { ref job } if job == "empty"));
  assert_eq!(empty.state(), State::Ready);
  assert_eq!(square.listener_count(), 0);

  // upstream is unaffected
  assert_eq!(scheduler.schedule(&square, 2).unwrap().get().unwrap(), 4);
  assert_eq!(empty.state(), State::Ready);
}

#[test]
fn upstream_without_computation_cannot_strand_a_chain() {
  let scheduler = init();
  let ran = Arc::new(AtomicBool::new(false));
  let empty = Job::<u64, u64>::builder().name("empty").build();
  let digits = digits(ran.clone());

  let fut = scheduler.schedule_after(&digits, &empty, |n: &u64| n.to_string())
                     .unwrap();

  assert!(matches!(scheduler.schedule(&empty, 1), Err(Error::UndefinedComputation { .. })));
  assert_eq!(empty.state(), State::Ready);

  // the chain is still waiting and can be cancelled cleanly
  assert!(!fut.is_done());
  assert!(fut.cancel(false));
  assert_eq!(digits.state(), State::Canceled);
  assert_eq!(empty.listener_count(), 0);
  assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn fired_continuation_is_removed_from_upstream() {
  let scheduler = init();
  let square = square();
  let plus_one = Job::named("plus-one", |x: &u64| Ok::<_, String>(x + 1));
  square.add_listener(hooks::logging());

  let fut = scheduler.chain(&plus_one, &square).unwrap();
  assert_eq!(square.listener_count(), 2);

  scheduler.schedule(&square, 3).unwrap().get().unwrap();

  assert_eq!(fut.get().unwrap(), 10);
  assert_eq!(square.listener_count(), 1);
  assert_eq!(square.remove_all_listeners().len(), 1);
}

#[test]
fn failed_upstream_drops_its_continuation() {
  let scheduler = init();
  let ran = Arc::new(AtomicBool::new(false));
  let broken = Job::<u64, u64>::named("broken", |_: &u64| Err("no"));
  let digits = digits(ran.clone());

  let fut = scheduler.schedule_after(&digits, &broken, |n: &u64| n.to_string())
                     .unwrap();
  broken.run(1).unwrap_err();

  assert!(fut.is_cancelled());
  assert_eq!(broken.listener_count(), 0);
}

#[test]
fn many_chains_on_one_upstream_all_detach() {
  let scheduler = init();
  let upstream = square();
  let futures = (0..8).map(|n| {
                        let job = Job::named(format!("fan-{}", n), |x: &u64| Ok::<_, String>(*x));
                        scheduler.chain(&job, &upstream).unwrap()
                      })
                      .collect::<Vec<_>>();

  thread::spawn({
    let upstream = upstream.clone();
    move || upstream.run(5)
  }).join()
    .unwrap()
    .unwrap();

  for fut in futures {
    assert_eq!(fut.get().unwrap(), 25);
  }
  assert_eq!(upstream.listener_count(), 0);
}
