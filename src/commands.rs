//! MI command text builders.
//!
//! Kept in one place so the exact wire text is greppable and unit-tested.
//! The backend is sensitive to argument order and the `--thread-group i1`
//! qualifier on insert/continue.

pub fn break_insert_file(path: &str, line: u32) -> String {
    format!("-break-insert --thread-group i1 -f {path}:{line}")
}

pub fn break_insert_function(name: &str) -> String {
    format!("-break-insert {name}")
}

pub fn break_delete(id: u32) -> String {
    format!("-break-delete {id}")
}

pub fn break_enable(id: u32) -> String {
    format!("-break-enable {id}")
}

pub fn break_disable(id: u32) -> String {
    format!("-break-disable {id}")
}

pub fn break_after(id: u32, ignore: i64) -> String {
    format!("-break-after {id} {ignore}")
}

/// An empty condition clears any previously set condition.
pub fn break_condition(id: u32, condition: Option<&str>) -> String {
    match condition {
        Some(expr) if !expr.is_empty() => format!("-break-condition {id} {expr}"),
        _ => format!("-break-condition {id}"),
    }
}

pub fn exec_continue() -> String {
    "-exec-continue --thread-group i1".to_string()
}

pub fn exec_interrupt() -> String {
    "-exec-interrupt".to_string()
}

pub fn exec_step(thread_id: i64) -> String {
    format!("-exec-step --thread {thread_id}")
}

pub fn exec_next(thread_id: i64) -> String {
    format!("-exec-next --thread {thread_id}")
}

pub fn exec_finish(thread_id: i64) -> String {
    format!("-exec-finish --thread {thread_id} --frame 0")
}

pub fn stack_info_depth(thread_id: i64) -> String {
    format!("-stack-info-depth --thread {thread_id} --frame 0")
}

pub fn stack_list_frames(thread_id: i64) -> String {
    format!("-stack-list-frames --thread {thread_id}")
}

pub fn stack_list_variables(thread_id: i64, frame: u32) -> String {
    format!("-stack-list-variables --thread {thread_id} --frame {frame} --simple-values")
}

pub fn thread_select(thread_id: i64) -> String {
    format!("-thread-select {thread_id}")
}

pub fn thread_list_ids() -> String {
    "-thread-list-ids".to_string()
}

pub fn var_create(name: &str) -> String {
    format!("-var-create {name} \"*\" {name}")
}

pub fn var_delete(name: &str) -> String {
    format!("-var-delete {name}")
}

pub fn var_list_children(name: &str) -> String {
    format!("-var-list-children --all-values {name} 0 50")
}

pub fn data_evaluate_expression(expr: &str) -> String {
    format!("-data-evaluate-expression \"{expr}\"")
}

pub fn kill() -> String {
    "kill".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_insert_carries_thread_group() {
        assert_eq!(
            break_insert_file("/src/app/main.c", 42),
            "-break-insert --thread-group i1 -f /src/app/main.c:42"
        );
        assert_eq!(break_insert_function("main"), "-break-insert main");
    }

    #[test]
    fn test_break_management_commands() {
        assert_eq!(break_delete(3), "-break-delete 3");
        assert_eq!(break_enable(3), "-break-enable 3");
        assert_eq!(break_disable(3), "-break-disable 3");
        assert_eq!(break_after(3, 9), "-break-after 3 9");
    }

    #[test]
    fn test_break_condition_clears_when_empty() {
        assert_eq!(break_condition(2, Some("x > 5")), "-break-condition 2 x > 5");
        assert_eq!(break_condition(2, Some("")), "-break-condition 2");
        assert_eq!(break_condition(2, None), "-break-condition 2");
    }

    #[test]
    fn test_execution_commands() {
        assert_eq!(exec_continue(), "-exec-continue --thread-group i1");
        assert_eq!(exec_interrupt(), "-exec-interrupt");
        assert_eq!(exec_step(2), "-exec-step --thread 2");
        assert_eq!(exec_next(2), "-exec-next --thread 2");
        assert_eq!(exec_finish(2), "-exec-finish --thread 2 --frame 0");
    }

    #[test]
    fn test_inspection_commands() {
        assert_eq!(stack_info_depth(1), "-stack-info-depth --thread 1 --frame 0");
        assert_eq!(
            stack_list_variables(1, 0),
            "-stack-list-variables --thread 1 --frame 0 --simple-values"
        );
        assert_eq!(var_create("count"), "-var-create count \"*\" count");
        assert_eq!(
            var_list_children("count"),
            "-var-list-children --all-values count 0 50"
        );
        assert_eq!(
            data_evaluate_expression("x + 1"),
            "-data-evaluate-expression \"x + 1\""
        );
    }
}
