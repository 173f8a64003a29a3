use provdb::audit_log::AuditLogQuery;
use provdb::config::ProvConfig;
use provdb::offline;
use provdb::snapshot::SnapshotReadView;
use std::path::Path;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Err("missing command".into());
    }
    let rest = &args[2..];
    match args[1].as_str() {
        "versions" => cmd_versions(rest),
        "tables" => cmd_tables(rest),
        "unmapped" => cmd_unmapped(rest),
        "audit" => cmd_audit(rest),
        "check" => cmd_check(rest),
        other => {
            print_usage();
            Err(format!("unknown command: {other}"))
        }
    }
}

fn open(args: &[String]) -> Result<SnapshotReadView, String> {
    let path = parse_flag_value(args, "--checkpoint").ok_or("--checkpoint is required")?;
    offline::open_snapshot(Path::new(&path)).map_err(|e| format!("open {path}: {e}"))
}

fn version_suffix(args: &[String]) -> String {
    parse_flag_value(args, "--suffix").unwrap_or_else(|| ProvConfig::default().version_column_suffix)
}

fn cmd_versions(args: &[String]) -> Result<(), String> {
    let view = open(args)?;
    for summary in view.active_versions() {
        let family = &summary.family;
        let total = view.versions().list(family.id).len();
        match &summary.active {
            Some(version) => println!(
                "{}\t{}\t{}\t{}\t{}",
                family.code, family.label, version.version_number, version.id, total
            ),
            None => println!("{}\t{}\t-\t-\t{}", family.code, family.label, total),
        }
    }
    Ok(())
}

fn cmd_tables(args: &[String]) -> Result<(), String> {
    let view = open(args)?;
    let code = parse_flag_value(args, "--family").ok_or("--family is required")?;
    let family = view
        .families()
        .require_by_code(&code)
        .map_err(|e| e.to_string())?;
    for table in view.tables_in_family(family.id).map_err(|e| e.to_string())? {
        let entry = view.domain_map().entry(&table);
        println!(
            "{}\t{}\t{}",
            table,
            entry.and_then(|e| e.version_column.as_deref()).unwrap_or("-"),
            entry.map(|e| e.note.as_str()).unwrap_or("")
        );
    }
    Ok(())
}

fn cmd_unmapped(args: &[String]) -> Result<(), String> {
    let view = open(args)?;
    let unmapped = view.unmapped_attributed_tables(&version_suffix(args));
    for table in &unmapped {
        println!("{table}");
    }
    if args.iter().any(|a| a == "--strict") && !unmapped.is_empty() {
        return Err(format!("{} unmapped table(s)", unmapped.len()));
    }
    Ok(())
}

fn cmd_audit(args: &[String]) -> Result<(), String> {
    let view = open(args)?;
    let mut query = AuditLogQuery::new();
    if let Some(table) = parse_flag_value(args, "--table") {
        query = query.table(table);
    }
    if let Some(actor) = parse_number(args, "--actor")? {
        query = query.actor(actor);
    }
    if let Some(since) = parse_number(args, "--since")? {
        query = query.since(since);
    }
    if let Some(until) = parse_number(args, "--until")? {
        query = query.until(until);
    }
    if let Some(limit) = parse_number(args, "--limit")? {
        query = query.limit(limit);
    }
    let json = args.iter().any(|a| a == "--json");
    for entry in view.audit_entries(&query, ProvConfig::default().max_audit_query_rows) {
        if json {
            let line = serde_json::to_string(&entry).map_err(|e| format!("encode entry: {e}"))?;
            println!("{line}");
        } else {
            let columns: Vec<&str> = entry.diff.keys().map(String::as_str).collect();
            println!(
                "{}\t{}\t{}\t{}\t{:?}\t{}\t{}",
                entry.id,
                entry.recorded_at_micros,
                entry.table_name,
                entry.operation.as_str(),
                entry.primary_key,
                entry.actor_id,
                columns.join(",")
            );
        }
    }
    Ok(())
}

fn cmd_check(args: &[String]) -> Result<(), String> {
    let path = parse_flag_value(args, "--checkpoint").ok_or("--checkpoint is required")?;
    let report = offline::invariant_report(Path::new(&path), &version_suffix(args))
        .map_err(|e| format!("invariants: {e}"))?;
    println!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        if report.ok { "ok" } else { "violations" },
        report.seq,
        report.family_count,
        report.version_count,
        report.table_count,
        report.audit_entries
    );
    for v in &report.violations {
        println!("violation\t{v}");
    }
    for w in &report.warnings {
        println!("warning\t{w}");
    }
    if report.ok {
        Ok(())
    } else {
        Err("invariant violations found".into())
    }
}

fn parse_flag_value(args: &[String], flag: &str) -> Option<String> {
    for idx in 0..args.len() {
        if args[idx] == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn parse_number<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>, String> {
    match parse_flag_value(args, flag) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| format!("invalid {flag}: {raw}")),
        None => Ok(None),
    }
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  provdb versions --checkpoint <file|dir>");
    eprintln!("  provdb tables --checkpoint <file|dir> --family <code>");
    eprintln!("  provdb unmapped --checkpoint <file|dir> [--suffix <suffix>] [--strict]");
    eprintln!(
        "  provdb audit --checkpoint <file|dir> [--table <name>] [--actor <id>] [--since <micros>] [--until <micros>] [--limit <n>] [--json]"
    );
    eprintln!("  provdb check --checkpoint <file|dir> [--suffix <suffix>]");
}
