use std::io::{self, Write};

use chrono::NaiveDateTime;
use planner_tool::TaskBoard;
use planner_tool::persistence::{
    export_tasks_to_csv, import_tasks_from_csv, load_board_from_json, save_board_to_json,
};
use planner_tool::pipeline::{BalanceMode, BumpPolicy, Placement, RunOptions};
use polars::prelude::{AnyValue, DataFrame};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

fn parse_id_list(s: &str) -> Vec<i32> {
    s.split(',')
        .filter_map(|p| p.trim().parse::<i32>().ok())
        .collect()
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

fn cell_to_string(av: &AnyValue, col_name: &str) -> String {
    match av {
        AnyValue::Null => String::new(),
        AnyValue::Int32(v) => v.to_string(),
        AnyValue::Int64(v) => v.to_string(),
        AnyValue::Float64(v) => format!("{v:.2}"),
        AnyValue::Boolean(v) => v.to_string(),
        AnyValue::String(s) => s.to_string(),
        AnyValue::List(inner) if col_name == "dependencies" => {
            if let Ok(ca) = inner.i32() {
                ca.into_iter()
                    .flatten()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            } else {
                av.to_string()
            }
        }
        _ => av.to_string(),
    }
}

fn render_df_as_text_table(df: &DataFrame) -> String {
    let columns = df.get_columns();
    let col_names: Vec<String> = columns.iter().map(|c| c.name().to_string()).collect();

    let mut widths: Vec<usize> = col_names.iter().map(|n| n.len()).collect();
    for (ci, col) in columns.iter().enumerate() {
        for row_idx in 0..df.height() {
            if let Ok(ref av) = col.get(row_idx) {
                let s = cell_to_string(av, col.name());
                if s.len() > widths[ci] {
                    widths[ci] = s.len();
                }
            }
        }
    }

    let mut sep = String::new();
    sep.push('+');
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let mut out = String::new();
    out.push_str(&sep);
    out.push('\n');

    out.push('|');
    for (i, name) in col_names.iter().enumerate() {
        out.push(' ');
        out.push_str(name);
        let pad = widths[i] - name.len();
        if pad > 0 {
            out.push_str(&" ".repeat(pad));
        }
        out.push(' ');
        out.push('|');
    }
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');

    for row_idx in 0..df.height() {
        out.push('|');
        for (ci, col) in columns.iter().enumerate() {
            let s = col
                .get(row_idx)
                .map(|av| cell_to_string(&av, col.name()))
                .unwrap_or_default();
            out.push(' ');
            out.push_str(&s);
            let pad = widths[ci].saturating_sub(s.len());
            if pad > 0 {
                out.push_str(&" ".repeat(pad));
            }
            out.push(' ');
            out.push('|');
        }
        out.push('\n');
    }

    out.push_str(&sep);
    out.push('\n');
    out
}

fn print_help() {
    println!(
        "Commands:\n  help                               Show this help\n  show                               Show the task table\n  add <minutes> <title...>           Add a task\n  rm <id>                            Remove a task\n  due <id> <YYYY-MM-DDTHH:MM|none>   Set or clear the due date\n  imp <id> <1-10>                    Set importance\n  cx <id> <float>                    Set complexity\n  dur <id> <minutes>                 Set estimated duration\n  deps <id> <csv|none>               Set dependencies (e.g. 1,2,3)\n  pin <id> <true|false>              Pin or unpin\n  split <id> <true|false>            Allow or forbid splitting\n  progress <id> <0..1>               Set progress\n  done <id>                          Mark completed\n  event <start> <end> <title...>     Add a calendar event\n  events                             List events\n  rmevent <id>                       Remove an event\n  now <YYYY-MM-DDTHH:MM|real>        Pin or release the clock\n  plan [priority|priority_single|balanced|gold_panning]\n                                     Run the scheduler\n  reindex                            Renumber display ids\n  save <path.json>                   Save the board\n  load <path.json>                   Load a board\n  export <path.csv>                  Export tasks to CSV\n  import <path.csv>                  Import tasks from CSV\n  quit|exit                          Exit"
    );
}

fn parse_placement(input: Option<&str>) -> Option<Placement> {
    match input {
        None => Some(Placement::default()),
        Some("priority") => Some(Placement::Priority(BumpPolicy::MultiAppeal)),
        Some("priority_single") => Some(Placement::Priority(BumpPolicy::Single)),
        Some("balanced") => Some(Placement::Balanced(BalanceMode::Density)),
        Some("gold_panning") => Some(Placement::Balanced(BalanceMode::GoldPanning)),
        Some(_) => None,
    }
}

fn main() {
    let mut board = TaskBoard::new();

    println!("Planner Tool (CLI) - type 'help' for commands\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        if stdin.read_line(&mut line).is_err() {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => break,
            "show" => {
                println!("{}", render_df_as_text_table(board.dataframe()));
            }
            "add" => {
                let minutes_s = parts.next();
                let rest: Vec<&str> = parts.collect();
                match (minutes_s, !rest.is_empty()) {
                    (Some(minutes_s), true) => {
                        let minutes: i64 = match minutes_s.parse() {
                            Ok(v) => v,
                            Err(_) => {
                                println!("Invalid minutes");
                                continue;
                            }
                        };
                        let title = rest.join(" ");
                        match board.add_task(&title, minutes) {
                            Ok(id) => {
                                println!("Added task id={id}");
                                println!("{}", render_df_as_text_table(board.dataframe()));
                            }
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    _ => println!("Usage: add <minutes> <title...>"),
                }
            }
            "rm" => match parts.next().and_then(|s| s.parse::<i32>().ok()) {
                Some(id) => match board.remove_task(id) {
                    Ok(()) => println!("Task removed."),
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Usage: rm <id>"),
            },
            "due" => {
                let id_s = parts.next();
                let when_s = parts.next();
                match (id_s, when_s) {
                    (Some(id_s), Some(when_s)) => {
                        let id: i32 = match id_s.parse() {
                            Ok(v) => v,
                            Err(_) => {
                                println!("Invalid id");
                                continue;
                            }
                        };
                        let due = if when_s.eq_ignore_ascii_case("none") {
                            None
                        } else {
                            match parse_datetime(when_s) {
                                Some(d) => Some(d),
                                None => {
                                    println!("Invalid datetime (YYYY-MM-DDTHH:MM)");
                                    continue;
                                }
                            }
                        };
                        match board.set_due(id, due) {
                            Ok(()) => println!("due set."),
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    _ => println!("Usage: due <id> <YYYY-MM-DDTHH:MM|none>"),
                }
            }
            "imp" | "cx" | "dur" | "progress" => {
                let id_s = parts.next();
                let val_s = parts.next();
                match (id_s, val_s) {
                    (Some(id_s), Some(val_s)) => {
                        let id: i32 = match id_s.parse() {
                            Ok(v) => v,
                            Err(_) => {
                                println!("Invalid id");
                                continue;
                            }
                        };
                        let res = match cmd {
                            "imp" => match val_s.parse::<i32>() {
                                Ok(v) => board.set_importance(id, v),
                                Err(_) => {
                                    println!("Invalid integer");
                                    continue;
                                }
                            },
                            "cx" => match val_s.parse::<f64>() {
                                Ok(v) => board.set_complexity(id, v),
                                Err(_) => {
                                    println!("Invalid float");
                                    continue;
                                }
                            },
                            "dur" => match val_s.parse::<i64>() {
                                Ok(v) => board.set_estimated_minutes(id, v),
                                Err(_) => {
                                    println!("Invalid minutes");
                                    continue;
                                }
                            },
                            _ => match val_s.parse::<f64>() {
                                Ok(v) => board.set_progress(id, v),
                                Err(_) => {
                                    println!("Invalid float");
                                    continue;
                                }
                            },
                        };
                        match res {
                            Ok(()) => println!("{cmd} set."),
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    _ => println!("Usage: {cmd} <id> <value>"),
                }
            }
            "deps" => {
                let id_s = parts.next();
                let csv = parts.next();
                match (id_s, csv) {
                    (Some(id_s), Some(csv)) => {
                        let id: i32 = match id_s.parse() {
                            Ok(v) => v,
                            Err(_) => {
                                println!("Invalid id");
                                continue;
                            }
                        };
                        let deps = if csv.eq_ignore_ascii_case("none") {
                            Vec::new()
                        } else {
                            parse_id_list(csv)
                        };
                        match board.set_dependencies(id, deps) {
                            Ok(()) => println!("dependencies set."),
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    _ => println!("Usage: deps <id> <csv|none>"),
                }
            }
            "pin" | "split" => {
                let id_s = parts.next();
                let val_s = parts.next();
                match (id_s, val_s) {
                    (Some(id_s), Some(val_s)) => {
                        let id: i32 = match id_s.parse() {
                            Ok(v) => v,
                            Err(_) => {
                                println!("Invalid id");
                                continue;
                            }
                        };
                        let val = match val_s.to_ascii_lowercase().as_str() {
                            "true" => true,
                            "false" => false,
                            _ => {
                                println!("Invalid bool (true|false)");
                                continue;
                            }
                        };
                        let res = if cmd == "pin" {
                            board.set_pinned(id, val)
                        } else {
                            board.set_divisible(id, val)
                        };
                        match res {
                            Ok(()) => println!("{cmd} set."),
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    _ => println!("Usage: {cmd} <id> <true|false>"),
                }
            }
            "done" => match parts.next().and_then(|s| s.parse::<i32>().ok()) {
                Some(id) => match board.complete_task(id) {
                    Ok(()) => println!("Task completed."),
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Usage: done <id>"),
            },
            "event" => {
                let start_s = parts.next();
                let end_s = parts.next();
                let rest: Vec<&str> = parts.collect();
                match (start_s, end_s, !rest.is_empty()) {
                    (Some(start_s), Some(end_s), true) => {
                        let (Some(start), Some(end)) =
                            (parse_datetime(start_s), parse_datetime(end_s))
                        else {
                            println!("Invalid datetime (YYYY-MM-DDTHH:MM)");
                            continue;
                        };
                        let title = rest.join(" ");
                        match board.add_event(&title, start, end) {
                            Ok(id) => println!("Added event id={id}"),
                            Err(e) => println!("Error: {e}"),
                        }
                    }
                    _ => println!("Usage: event <start> <end> <title...>"),
                }
            }
            "events" => {
                for event in board.events() {
                    println!(
                        "{:>4}  {} - {}  {}",
                        event.id,
                        event.start.format(DATETIME_FORMAT),
                        event.end.format(DATETIME_FORMAT),
                        event.title
                    );
                }
            }
            "rmevent" => match parts.next().and_then(|s| s.parse::<i32>().ok()) {
                Some(id) => match board.remove_event(id) {
                    Ok(()) => println!("Event removed."),
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Usage: rmevent <id>"),
            },
            "now" => match parts.next() {
                Some("real") => {
                    board.clock_mut().clear_simulated();
                    println!("Clock released.");
                }
                Some(when_s) => match parse_datetime(when_s) {
                    Some(when) => {
                        board.clock_mut().set_simulated(when);
                        println!("Clock pinned at {}.", when.format(DATETIME_FORMAT));
                    }
                    None => println!("Invalid datetime (YYYY-MM-DDTHH:MM)"),
                },
                None => println!("Usage: now <YYYY-MM-DDTHH:MM|real>"),
            },
            "plan" => {
                let Some(placement) = parse_placement(parts.next()) else {
                    println!(
                        "Unknown strategy (priority|priority_single|balanced|gold_panning)"
                    );
                    continue;
                };
                match board.plan(RunOptions { placement }) {
                    Ok(outcome) => {
                        for line in &outcome.trace {
                            println!("  {line}");
                        }
                        if !outcome.unscheduled.is_empty() {
                            println!("Unscheduled:");
                            for entry in &outcome.unscheduled {
                                println!("  task {}: {}", entry.task_id, entry.reason);
                            }
                        }
                        println!("{}", render_df_as_text_table(board.dataframe()));
                    }
                    Err(e) => println!("Plan error: {e}"),
                }
            }
            "reindex" => match board.reindex_display_ids() {
                Ok(()) => println!("{}", render_df_as_text_table(board.dataframe())),
                Err(e) => println!("Error: {e}"),
            },
            "save" => match parts.next() {
                Some(path) => match save_board_to_json(&board, path) {
                    Ok(()) => println!("Saved to {path}."),
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Usage: save <path.json>"),
            },
            "load" => match parts.next() {
                Some(path) => match load_board_from_json(path) {
                    Ok(loaded) => {
                        board = loaded;
                        println!("{}", render_df_as_text_table(board.dataframe()));
                    }
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Usage: load <path.json>"),
            },
            "export" => match parts.next() {
                Some(path) => match export_tasks_to_csv(&board, path) {
                    Ok(()) => println!("Exported to {path}."),
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Usage: export <path.csv>"),
            },
            "import" => match parts.next() {
                Some(path) => match import_tasks_from_csv(path) {
                    Ok(loaded) => {
                        board = loaded;
                        println!("{}", render_df_as_text_table(board.dataframe()));
                    }
                    Err(e) => println!("Error: {e}"),
                },
                None => println!("Usage: import <path.csv>"),
            },
            _ => {
                println!("Unknown command. Type 'help'.");
            }
        }
    }
}
