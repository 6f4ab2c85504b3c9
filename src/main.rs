use std::path::Path;

use anyhow::Result;
use exam_question_pipeline::utils::logging;
use exam_question_pipeline::{App, Config};

const USAGE: &str = "用法:
  exam_question_pipeline extract <文件>
  exam_question_pipeline grade <exam.toml> <answers.toml> <考生ID>";

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let app = App::initialize(config)?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["extract", file] => app.extract(Path::new(file)).await?,
        ["grade", exam, answers, learner] => {
            app.grade(Path::new(exam), Path::new(answers), learner).await?
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}
