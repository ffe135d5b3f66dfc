use chrono::{NaiveDate, NaiveTime, Weekday};
use planner_tool::TaskBoard;
use planner_tool::persistence::{
    export_tasks_to_csv, import_tasks_from_csv, load_board_from_json, save_board_to_json,
};
use tempfile::tempdir;

fn dt(day: u32, h: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, day)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn sample_board() -> TaskBoard {
    let mut board = TaskBoard::new();
    let a = board.add_task("draft proposal", 180).unwrap();
    let b = board.add_task("review proposal", 60).unwrap();
    board.set_importance(a, 7).unwrap();
    board.set_due(a, Some(dt(10, 17))).unwrap();
    board.set_dependencies(b, vec![a]).unwrap();
    board.set_divisible(a, true).unwrap();
    board
        .add_event("weekly sync", dt(7, 10), dt(7, 11))
        .unwrap();
    let list = board.add_list("Q1 work");
    board.assign_to_list(a, list).unwrap();

    let mut profile = board.profile().clone();
    profile.set_working_days(vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
    ]);
    profile.day_end = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    profile.breather_minutes = 10;
    board.set_profile(profile);
    board
}

#[test]
fn json_round_trip_preserves_the_whole_board() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("board.json");
    let board = sample_board();

    save_board_to_json(&board, &path).unwrap();
    let loaded = load_board_from_json(&path).unwrap();

    assert_eq!(loaded.tasks().unwrap(), board.tasks().unwrap());
    assert_eq!(loaded.events(), board.events());
    assert_eq!(loaded.lists(), board.lists());
    assert_eq!(loaded.profile(), board.profile());
    assert_eq!(loaded.counters(), board.counters());
}

#[test]
fn json_load_continues_id_assignment() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("board.json");
    let board = sample_board();
    save_board_to_json(&board, &path).unwrap();

    let mut loaded = load_board_from_json(&path).unwrap();
    let next = loaded.add_task("new task", 30).unwrap();
    assert!(board.tasks().unwrap().iter().all(|t| t.id != next));
}

#[test]
fn csv_round_trip_preserves_tasks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tasks.csv");
    let board = sample_board();

    export_tasks_to_csv(&board, &path).unwrap();
    let imported = import_tasks_from_csv(&path).unwrap();

    assert_eq!(imported.tasks().unwrap(), board.tasks().unwrap());
}

#[test]
fn csv_survives_scheduled_fragments() {
    use planner_tool::pipeline::RunOptions;
    let dir = tempdir().unwrap();
    let path = dir.path().join("tasks.csv");
    let mut board = sample_board();
    board.clock_mut().set_simulated(dt(6, 8));
    board.plan(RunOptions::default()).unwrap();

    export_tasks_to_csv(&board, &path).unwrap();
    let imported = import_tasks_from_csv(&path).unwrap();

    for (orig, back) in board
        .tasks()
        .unwrap()
        .iter()
        .zip(imported.tasks().unwrap().iter())
    {
        assert_eq!(orig.scheduled_parts, back.scheduled_parts);
    }
}

#[test]
fn empty_csv_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    std::fs::write(&path, "").unwrap();
    assert!(import_tasks_from_csv(&path).is_err());
}

#[test]
fn invalid_importance_fails_validation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tasks.csv");
    let board = sample_board();
    export_tasks_to_csv(&board, &path).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let corrupted = contents.replacen(",7,", ",70,", 1);
    assert_ne!(contents, corrupted);
    std::fs::write(&path, corrupted).unwrap();
    assert!(import_tasks_from_csv(&path).is_err());
}
