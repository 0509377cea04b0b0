mod build;
mod cli;
mod frozen;
mod launch;
