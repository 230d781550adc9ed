use crate::model::{day_key, Profile, StepMetrics, StepRecord, Task, TaskSet};

pub fn format_task_line(task: &Task) -> String {
    format!(
        "- [{}] {} ({}, id {})",
        if task.completed { "x" } else { " " },
        task.title,
        task.kind_label(),
        task.id
    )
}

pub fn format_task_list(set: &TaskSet) -> String {
    let mut output = String::new();
    output.push_str(&format!("Tasks for {}\n", set.date));
    output.push_str(&format!(
        "Completed: {}/{}\n",
        set.completed_count(),
        set.tasks.len()
    ));
    output.push('\n');
    if set.tasks.is_empty() {
        output.push_str("No tasks found.");
        return output;
    }
    for task in &set.tasks {
        output.push_str(&format_task_line(task));
        output.push('\n');
    }
    output.trim_end().to_string()
}

pub fn format_tasks_markdown(set: &TaskSet) -> String {
    let mut lines = Vec::new();
    lines.push(format!("# Tasks for {}", set.date));
    lines.push(String::new());
    lines.push(format!(
        "- **Completed:** {}/{}",
        set.completed_count(),
        set.tasks.len()
    ));
    lines.push(String::new());
    if set.tasks.is_empty() {
        lines.push("*No tasks*".to_string());
        return lines.join("\n");
    }
    for task in &set.tasks {
        let custom = if task.custom { " *(custom)*" } else { "" };
        lines.push(format!(
            "- [{}] {}{}",
            if task.completed { "x" } else { " " },
            task.title,
            custom
        ));
    }
    lines.join("\n")
}

pub fn format_step_summary(record: &StepRecord, metrics: &StepMetrics, weighted: bool) -> String {
    let mut output = String::new();
    output.push_str(&format!("Date: {}\n", day_key(record.date)));
    output.push_str(&format!("Steps: {}\n", metrics.steps));
    output.push_str(&format!("Distance: {:.2} km\n", metrics.distance_km));
    if weighted {
        output.push_str(&format!("Calories: {:.1} kcal", metrics.calories));
    } else {
        output.push_str(&format!(
            "Calories: {:.1} kcal (no weight set)",
            metrics.calories
        ));
    }
    output
}

pub fn format_profile(profile: &Profile) -> String {
    fn or_unset(value: Option<String>) -> String {
        value.unwrap_or_else(|| "(not set)".to_string())
    }

    let mut output = String::new();
    output.push_str(&format!("Username: {}\n", or_unset(profile.username.clone())));
    output.push_str(&format!(
        "Height: {}\n",
        or_unset(profile.height_cm.map(|value| format!("{value} cm")))
    ));
    output.push_str(&format!(
        "Weight: {}",
        or_unset(profile.weight_kg.map(|value| format!("{value} kg")))
    ));
    output
}
