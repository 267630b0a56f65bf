/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use tracing::info;

/// 记录程序启动信息
///
/// # 参数
/// - `max_concurrent`: 最大并发评分数
/// - `evaluation_backend`: 评分后端名称
pub fn log_startup(max_concurrent: usize, evaluation_backend: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量作业评分模式");
    info!("🤖 评分后端: {}", evaluation_backend);
    info!("📊 最大并发数: {}", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录评分清单加载信息
pub fn log_manifest_loaded(assignments: usize, submissions: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 份作业，共 {} 份提交", assignments, submissions);
    info!("📋 每份作业的提交最多并发 {} 个评分\n", max_concurrent);
}

/// 记录作业开始信息
///
/// # 参数
/// - `index`: 作业编号（从 1 开始）
/// - `total`: 作业总数
/// - `title`: 作业标题
/// - `submissions`: 提交数量
pub fn log_assignment_start(index: usize, total: usize, title: &str, submissions: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 份作业: {}", index, total, title);
    info!("📄 本作业提交: {} 份", submissions);
    info!("{}", "=".repeat(60));
}

/// 记录作业完成信息
pub fn log_assignment_complete(index: usize, graded: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 第 {} 份作业完成: 成功 {}/{}", index, graded, total);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `graded`: 评分成功数量
/// - `failures`: 各类失败及数量
/// - `cancelled`: 被取消数量
/// - `total`: 总数
/// - `results_file`: 结果文件路径
pub fn print_final_stats(
    graded: usize,
    failures: &[(String, usize)],
    cancelled: usize,
    total: usize,
    results_file: &str,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部评分完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", graded, total);
    for (kind, count) in failures {
        info!("❌ {}: {}", kind, count);
    }
    if cancelled > 0 {
        info!("⏹️ 已取消: {}", cancelled);
    }
    info!("{}", "=".repeat(60));
    info!("\n评分结果已保存至: {}", results_file);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("线粒体是细胞的动力工厂", 3), "线粒体...");
        assert_eq!(truncate_text("short", 10), "short");
    }
}
