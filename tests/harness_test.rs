//! Library-level tests tying extraction, execution and explanation together

use std::time::{Duration, Instant};

use condtrace::harness::{LineStatus, Outcome};
use condtrace::{evaluate_failure_reason, extract_paths, run_with_coverage, HarnessConfig};

const GRADE: &str = "public class Grader {
    public String grade(int score, int bonus) {
        int total = score + bonus;
        if (total >= 90) {
            return \"A\";
        } else if (total >= 50) {
            return \"B\";
        }
        int missing = 50 - total;
        return \"F by \" + missing;
    }
}
";

fn tuples(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_paths_and_coverage_agree() {
    let facts = extract_paths(GRADE).unwrap();
    let lines: Vec<usize> = facts.iter().map(|f| f.line).collect();
    assert_eq!(lines, vec![5, 7]);
    assert_eq!(
        facts[1].entry(),
        "7|PATH_TO_IF: !(total >= 90) [SUB_LOGIC: total = score + bonus] && (total >= 50) [SUB_LOGIC: total = score + bonus]"
    );

    let report = run_with_coverage(GRADE, &tuples(&["[95, 0]", "[40, 20]", "[10, 5]"]), &HarnessConfig::default())
        .unwrap();
    for fact in &facts {
        assert_eq!(report.lines[fact.line - 1].status, LineStatus::Hit, "line {}", fact.line);
    }
    assert_eq!(report.executions[2].outcome, Outcome::Returned("F by 35".to_string()));
    assert_eq!(report.ratio, 100.0);
}

#[test]
fn test_explanation_for_missed_branch() {
    let facts = extract_paths(GRADE).unwrap();
    let text = evaluate_failure_reason(
        &facts[0].entry(),
        "[40, 5]",
        &["score".to_string(), "bonus".to_string()],
    );
    assert_eq!(
        text,
        "Condition '(score + bonus >= 90)' [40 + 5 = 45] - Value must be greater than or equal to threshold"
    );
}

#[test]
fn test_coverage_is_idempotent() {
    let inputs = tuples(&["[95, 0]", "[1, 1]"]);
    let first = run_with_coverage(GRADE, &inputs, &HarnessConfig::default()).unwrap();
    let second = run_with_coverage(GRADE, &inputs, &HarnessConfig::default()).unwrap();
    assert_eq!(first.hit_lines(), second.hit_lines());
    assert_eq!(first.render(), second.render());
}

#[test]
fn test_each_runaway_tuple_is_bounded_by_timeout() {
    let source = "public class Loop {
    public int run(int n) {
        int i = 0;
        while (i < n) {
            i = i * 1;
        }
        return i;
    }
}
";
    let config = HarnessConfig::default().with_timeout(Duration::from_millis(150));
    let started = Instant::now();
    let report = run_with_coverage(source, &tuples(&["[3]", "[5]", "[0]"]), &config).unwrap();

    // two timeouts plus one quick run, with slack for thread start-up
    assert!(started.elapsed() < Duration::from_millis(1500));
    assert_eq!(report.executions[0].outcome, Outcome::TimedOut);
    assert_eq!(report.executions[1].outcome, Outcome::TimedOut);
    assert_eq!(report.executions[2].outcome, Outcome::Returned("0".to_string()));
    assert!(report.render().contains("Input: [3] -> ERROR: INFINITE LOOP DETECTED (Timeout)"));
}

#[test]
fn test_records_and_arrays_as_inputs() {
    let source = "public class Orders {
    public double total(Order order, int[] quantities) {
        double sum = 0;
        for (int q : quantities) {
            if (q < 0) {
                throw new IllegalArgumentException(\"negative quantity \" + q);
            }
            sum += q * order.price;
        }
        if (order.express) {
            sum = sum + 10;
        }
        return sum;
    }

    static class Order {
        public double price;
        public boolean express;
    }
}
";
    let report = run_with_coverage(
        source,
        &tuples(&[
            r#"[{"price": 2.5, "express": true}, [1, 2]]"#,
            r#"[{"price": 1}, [3, -1]]"#,
        ]),
        &HarnessConfig::default(),
    )
    .unwrap();

    assert_eq!(report.entry, "Orders.total(Order, int[])");
    assert_eq!(report.executions[0].outcome, Outcome::Returned("17.5".to_string()));
    assert_eq!(
        report.executions[1].outcome,
        Outcome::Threw("negative quantity -1".to_string())
    );
    assert_eq!(report.ratio, 100.0);
}

#[test]
fn test_oversized_allocation_does_not_abort_the_batch() {
    let source = "public class Grid {
    public int cells(int n) {
        if (n > 1000) {
            int[][] grid = new int[n][n];
            return grid.length;
        }
        return n;
    }
}
";
    let config = HarnessConfig::default().with_timeout(Duration::from_millis(1500));
    let report = run_with_coverage(source, &tuples(&["[40000]", "[7]"]), &config).unwrap();

    assert_eq!(report.executions.len(), 2);
    assert_eq!(report.executions[0].outcome, Outcome::Threw("Java heap space".to_string()));
    assert_eq!(report.executions[1].outcome, Outcome::Returned("7".to_string()));
    assert_eq!(report.hit_lines().into_iter().collect::<Vec<_>>(), vec![3, 4, 7]);
}

#[test]
fn test_integral_inputs_are_exact_or_skipped() {
    let source = "public class Ids {
    public long echo(long id, int slot) {
        return id + slot;
    }
}
";
    let report = run_with_coverage(
        source,
        &tuples(&["[9007199254740993, 0]", "[1, 3000000000]"]),
        &HarnessConfig::default(),
    )
    .unwrap();

    assert_eq!(report.executions[0].outcome, Outcome::Returned("9007199254740993".to_string()));
    assert!(
        matches!(&report.executions[1].outcome, Outcome::Skipped(reason) if reason.contains("out of range for int")),
        "{:?}",
        report.executions[1].outcome
    );
}
