
mod property_partition;
