/// Plot a series as ASCII art, for logs on machines without an image viewer.
pub fn plot_series(values: &[f32], title: &str, width: usize, height: usize) -> String {
    if values.is_empty() || width < 10 || height < 5 {
        return format!("{}: Invalid data or dimensions", title);
    }

    let min_val = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max_val = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    if (max_val - min_val).abs() < f32::EPSILON {
        return format!("{}: All values are {:.4}", title, min_val);
    }

    let mut plot = vec![vec![' '; width]; height];

    for row in plot.iter_mut() {
        row[0] = '|';
    }
    for cell in plot[height - 1].iter_mut() {
        *cell = '-';
    }
    plot[height - 1][0] = '+';

    let last = (values.len() - 1).max(1) as f32;
    let y_scale = (height - 3) as f32 / (max_val - min_val);

    for (i, &value) in values.iter().enumerate() {
        let x = (2 + (i as f32 / last * (width - 3) as f32) as usize).min(width - 1);
        let offset = ((value - min_val) * y_scale) as usize;
        let y = (height - 2).saturating_sub(offset).min(height - 2);
        plot[y][x] = '*';
    }

    let mut output = format!("{}\n", title);
    output.push_str(&format!("Max: {:.4}\n", max_val));

    for row in plot.iter() {
        output.push_str(&row.iter().collect::<String>());
        output.push('\n');
    }

    output.push_str(&format!("Min: {:.4}\n", min_val));
    output.push_str(&format!("Points: {}\n", values.len()));

    output
}

/// One-line summary used by the report log
pub fn training_progress(
    step: usize,
    total_steps: usize,
    avg_reward: f32,
    avg_loss: Option<f32>,
    epsilon: f32,
) -> String {
    let progress = (step as f32 / total_steps.max(1) as f32).min(1.0);
    let bar_length = 30;
    let filled = (progress * bar_length as f32) as usize;
    let bar = format!("[{}{}]", "=".repeat(filled), " ".repeat(bar_length - filled));
    let loss = avg_loss.map(|l| format!("{:.4}", l)).unwrap_or_else(|| "n/a".to_string());

    format!(
        "Step {}/{} {} {:.1}% | Avg Reward: {:.2} | Avg Loss: {} | ε: {:.3}",
        step, total_steps, bar, progress * 100.0, avg_reward, loss, epsilon
    )
}
