use decay_join::{
    build_feature_schema, init_logging, job_config_from_env, log_app_start, log_job_config,
    logging_config_from_env, pipeline_config_from_env, read_events_file, write_output_file,
    PipelineComposer,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let job = job_config_from_env()?;
    let composer = PipelineComposer::new(pipeline_config_from_env()?)?;
    log_job_config(
        &job.input,
        &job.output,
        composer.config().stages.len(),
        composer.config().catalog.len(),
    );

    let schema = build_feature_schema(composer.config());
    let events = read_events_file(&job.input)?;
    let (targets, report) = composer.run(events)?;
    write_output_file(&job.output, &schema, &job.output_columns, &targets)?;

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
