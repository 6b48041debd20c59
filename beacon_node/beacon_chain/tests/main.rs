mod block_import;
mod peerdas;
