use super::JobStore;
use crate::job::{ActiveJob, Job, JobState};
use crate::queue::QueueOptions;
use crate::{Client, Error};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
impl JobStore for Client {
    async fn create_queue(&self, opts: &QueueOptions<'_>) -> Result<(), Error> {
        Client::create_queue(self, opts).await
    }

    async fn send_job(&self, job: &Job) -> Result<Uuid, Error> {
        Client::send_job(self, job).await
    }

    async fn fetch_jobs(
        &self,
        queue_name: &str,
        batch_size: usize,
    ) -> Result<Vec<ActiveJob>, Error> {
        Client::fetch_jobs(self, queue_name, batch_size).await
    }

    async fn complete_job(&self, queue_name: &str, job_id: Uuid) -> Result<bool, Error> {
        Client::complete_job(self, queue_name, job_id).await
    }

    async fn fail_job(
        &self,
        queue_name: &str,
        job_id: Uuid,
        error: &str,
        retryable: bool,
    ) -> Result<Option<JobState>, Error> {
        Client::fail_job(self, queue_name, job_id, error, retryable).await
    }

    async fn get_job(&self, queue_name: &str, job_id: Uuid) -> Result<Option<ActiveJob>, Error> {
        Client::get_job(self, queue_name, job_id).await
    }

    async fn expire_jobs(&self, queue_name: &str) -> Result<Vec<(Uuid, JobState)>, Error> {
        Client::expire_jobs(self, queue_name).await
    }
}
