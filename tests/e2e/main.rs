mod client;
mod email;
mod job_complete;
mod job_expire;
mod job_fail;
mod job_fetch;
mod job_send;
mod queue;
mod utils;
