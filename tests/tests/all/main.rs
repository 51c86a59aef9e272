mod endpoint_cache;
