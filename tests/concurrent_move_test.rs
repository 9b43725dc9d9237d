// ==========================================
// 并发人工调整测试
// ==========================================
// 职责: 验证同一作业的调整串行化、跨进程写冲突检测
// ==========================================


#[cfg(test)]
mod concurrent_move_test {
    use production_capacity::engine::ScheduleError;
    use production_capacity::repository::{
        JobRepository, JobStore, MachineRepository, ResourceRegistry,
    };
    use production_capacity::{
        CapacityAggregator, Department, Job, JobRow, MoveEngine, MovePolicy, MoveRequest,
        ReconcilePolicy, ReconciliationEngine,
    };
    use production_capacity::db::open_sqlite_connection;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    use crate::test_helpers::{at, create_test_db, RowBuilder};

    const WORKERS: usize = 8;

    fn request(po: &str, machine: &str, hour: u32) -> MoveRequest {
        MoveRequest {
            department: Department::Turning,
            process_order: po.to_string(),
            to_machine: machine.to_string(),
            new_duration_hours: 1.5,
            new_start: at(10, hour),
            new_priority: 2,
            moved_by: format!("worker-{}", hour),
            reason: None,
        }
    }

    /// 独立连接上的作业仓储（schema 已由 create_test_db 建好）
    fn connect(db_path: &str) -> Arc<JobRepository> {
        let conn = open_sqlite_connection(db_path).unwrap();
        Arc::new(JobRepository::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 上传 PO-0..PO-n
    fn seed(db_path: &str, jobs: usize) -> Arc<JobRepository> {
        let store = connect(db_path);
        let rows = (0..jobs)
            .map(|i| RowBuilder::new(&format!("PO-{}", i), "T1").build())
            .collect();

        ReconciliationEngine::new(store.clone(), ReconcilePolicy::default())
            .reconcile(Department::Turning, rows, "seed", "seed.csv")
            .unwrap();
        store
    }

    fn engine_on(store: Arc<JobRepository>, db_path: &str) -> Arc<MoveEngine> {
        let conn = open_sqlite_connection(db_path).unwrap();
        let registry: Arc<dyn ResourceRegistry> =
            Arc::new(MachineRepository::from_connection(Arc::new(Mutex::new(conn))));
        Arc::new(MoveEngine::new(store, registry, MovePolicy::default()))
    }

    fn job(store: &JobRepository, po: &str) -> Job {
        store.get_job(Department::Turning, po).unwrap().unwrap()
    }

    // ==========================================
    // 测试用例
    // ==========================================

    #[test]
    fn test_same_job_moves_serialize_within_engine() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let store = seed(&db_path, 1);
        let engine = engine_on(store.clone(), &db_path);

        let handles: Vec<_> = (0..WORKERS)
            .map(|i| {
                let engine = engine.clone();
                thread::spawn(move || engine.move_job(request("PO-0", "T2", i as u32)))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        // 每次调整都基于上一次结果，无丢失更新
        let final_job = job(&store, "PO-0");
        assert_eq!(final_job.revision, 1 + WORKERS as i32);
        assert!(final_job.manual_override);
        assert_eq!(final_job.machine, "T2");
    }

    #[test]
    fn test_different_jobs_move_in_parallel() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let store = seed(&db_path, WORKERS);
        let engine = engine_on(store.clone(), &db_path);

        let handles: Vec<_> = (0..WORKERS)
            .map(|i| {
                let engine = engine.clone();
                thread::spawn(move || {
                    engine.move_job(request(&format!("PO-{}", i), &format!("T{}", i), 6))
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        for i in 0..WORKERS {
            let moved = job(&store, &format!("PO-{}", i));
            assert_eq!(moved.machine, format!("T{}", i));
            assert_eq!(moved.revision, 2);
        }
    }

    #[test]
    fn test_cross_connection_moves_never_lose_updates() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed(&db_path, 1);

        // 每个线程独立连接，模拟多个进程
        let handles: Vec<_> = (0..WORKERS)
            .map(|i| {
                let db_path = db_path.clone();
                thread::spawn(move || {
                    let engine = engine_on(connect(&db_path), &db_path);
                    engine.move_job(request("PO-0", &format!("T{}", i), i as u32))
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => succeeded += 1,
                Err(ScheduleError::ConflictingWrite(_)) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert!(succeeded >= 1);
        let final_job = job(&connect(&db_path), "PO-0");
        assert_eq!(final_job.revision, 1 + succeeded);
        assert!(final_job.manual_override);
    }

    #[test]
    fn test_move_racing_reupload_is_preserved_or_conflicts() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let store = seed(&db_path, 4);
        let engine = engine_on(store.clone(), &db_path);

        let mover = {
            let engine = engine.clone();
            thread::spawn(move || engine.move_job(request("PO-2", "T9", 12)))
        };
        let uploader = {
            let db_path = db_path.clone();
            thread::spawn(move || {
                let store = connect(&db_path);
                let rows = (0..4)
                    .map(|i| {
                        RowBuilder::new(&format!("PO-{}", i), "T1")
                            .hours(4.0)
                            .build()
                    })
                    .collect();
                ReconciliationEngine::new(store, ReconcilePolicy::default()).reconcile(
                    Department::Turning,
                    rows,
                    "night-shift",
                    "reupload.csv",
                )
            })
        };

        let moved = mover.join().unwrap();
        let reconciled = uploader.join().unwrap();

        let po2 = job(&store, "PO-2");
        match (&moved, &reconciled) {
            // 调整成功后上传: 保留调整
            (Ok(_), Ok(report)) if report.merge.preserved == 1 => {
                assert_eq!(po2.machine, "T9");
                assert_eq!(po2.duration_hours, 1.5);
            }
            // 上传先落库: 调整基于新数据再应用
            (Ok(_), Ok(_)) => assert_eq!(po2.machine, "T9"),
            // 上传读到旧版本，写入时发现冲突并整体回滚
            (Ok(_), Err(ScheduleError::ConflictingWrite(_))) => {
                assert_eq!(po2.machine, "T9");
                assert_eq!(job(&store, "PO-0").duration_hours, 2.0);
            }
            // 调整读到旧版本
            (Err(ScheduleError::ConflictingWrite(_)), Ok(_)) => {
                assert_eq!(po2.machine, "T1");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(store.get_job(Department::Turning, "PO-3").unwrap().is_some());
    }

    /// 一整套排程: 工单号 {prefix}-0..n，全部在同一机台
    fn schedule_set(prefix: &str, machine: &str, n: usize) -> Vec<JobRow> {
        (0..n)
            .map(|i| RowBuilder::new(&format!("{}-{}", prefix, i), machine).build())
            .collect()
    }

    fn po_set(prefix: &str, n: usize) -> BTreeSet<String> {
        (0..n).map(|i| format!("{}-{}", prefix, i)).collect()
    }

    #[test]
    fn test_snapshot_never_observes_partial_merge() {
        const JOBS: usize = 10;
        const ROUNDS: usize = 12;

        let (_tmp, db_path) = create_test_db().unwrap();
        let store = connect(&db_path);
        ReconciliationEngine::new(store.clone(), ReconcilePolicy::default())
            .reconcile(Department::Turning, schedule_set("A", "T1", JOBS), "seed", "a.csv")
            .unwrap();

        let set_a = po_set("A", JOBS);
        let set_b = po_set("B", JOBS);
        let done = Arc::new(AtomicBool::new(false));

        // 读者: 独立连接反复生成快照
        let reader = {
            let db_path = db_path.clone();
            let done = done.clone();
            let (set_a, set_b) = (set_a.clone(), set_b.clone());
            thread::spawn(move || {
                let store = connect(&db_path);
                let conn = open_sqlite_connection(&db_path).unwrap();
                let registry: Arc<dyn ResourceRegistry> =
                    Arc::new(MachineRepository::from_connection(Arc::new(Mutex::new(conn))));
                let aggregator = CapacityAggregator::new(store, registry);

                let mut reads = 0;
                while !done.load(Ordering::SeqCst) || reads == 0 {
                    let snapshot = aggregator.snapshot(Department::Turning).unwrap();
                    let seen: BTreeSet<String> = snapshot
                        .segments
                        .iter()
                        .map(|s| s.process_order.clone())
                        .collect();
                    assert!(
                        seen == set_a || seen == set_b,
                        "partial job set observed: {:?}",
                        seen
                    );
                    let machines: BTreeSet<&str> =
                        snapshot.segments.iter().map(|s| s.machine.as_str()).collect();
                    assert_eq!(machines.len(), 1);
                    reads += 1;
                }
                reads
            })
        };

        // 写者: A/B 两套排程交替整体替换
        let engine = ReconciliationEngine::new(store.clone(), ReconcilePolicy::default());
        for round in 0..ROUNDS {
            let rows = if round % 2 == 0 {
                schedule_set("B", "T2", JOBS)
            } else {
                schedule_set("A", "T1", JOBS)
            };
            let report = engine
                .reconcile(Department::Turning, rows, "writer", "swap.csv")
                .unwrap();
            assert_eq!(report.merge.added, JOBS);
            assert_eq!(report.merge.removed, JOBS);
        }
        done.store(true, Ordering::SeqCst);

        let reads = reader.join().unwrap();
        assert!(reads >= 1);

        let final_set: BTreeSet<String> = store
            .list_jobs(Department::Turning)
            .unwrap()
            .into_iter()
            .map(|j| j.process_order)
            .collect();
        assert_eq!(final_set, set_a);
    }
}
