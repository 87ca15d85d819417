pub mod questions;
pub mod streams;

use actix_web::web;

/// Register every route. `/questions/stats` goes first so it is not captured
/// by `/questions/{question_id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(questions::question_stats)
        .service(questions::get_question)
        .service(questions::answer_question)
        .service(questions::cancel_question)
        .service(questions::wait_for_answer)
        .service(questions::list_job_questions)
        .service(questions::create_question)
        .service(questions::ask_question)
        .service(streams::open_stream)
        .service(streams::append_event)
        .service(streams::complete_stream)
        .service(streams::acknowledge_end)
        .service(streams::close_stream)
        .service(streams::cancel_stream)
        .service(streams::stream_health);
}
